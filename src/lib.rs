// src/lib.rs — Library root for prompt-doctor

pub mod cli;
pub mod generation;
pub mod infra;
pub mod render;
pub mod session;
pub mod store;
