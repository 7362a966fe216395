// src/cli/mod.rs — CLI definition (clap derive)

pub mod review;
pub mod versions;

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::infra::config::Config;
use crate::render::Context;

#[derive(Parser)]
#[command(
    name = "prompt-doctor",
    about = "Edit, render, and version prompt templates in the browser",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Prompts directory (overrides [store] dir)
    #[arg(long, global = true)]
    pub prompts_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an interactive review session for a template
    Review {
        /// Template id
        id: String,
        /// JSON file with template variables ("-" reads stdin)
        #[arg(short, long)]
        context: Option<String>,
        /// Model to call (overrides [generation] model)
        #[arg(short, long)]
        model: Option<String>,
        /// Port for the local review page (0 picks a free one)
        #[arg(short, long)]
        port: Option<u16>,
        /// Don't open the browser automatically
        #[arg(long)]
        no_browser: bool,
        /// Give up after this many seconds, discarding edits
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List saved versions of a template, newest first
    Versions {
        /// Template id
        id: String,
    },
    /// Print a saved version (latest when omitted)
    Show {
        /// Template id
        id: String,
        #[arg(long)]
        version: Option<u32>,
    },
    /// Render a saved version against a context, without calling the model
    Render {
        /// Template id
        id: String,
        #[arg(long)]
        version: Option<u32>,
        /// JSON file with template variables ("-" reads stdin)
        #[arg(short, long)]
        context: Option<String>,
    },
}

impl Cli {
    /// Load config (explicit path or default location) and apply global overrides.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        if let Some(ref dir) = self.prompts_dir {
            config.store.dir = dir.clone();
        }
        Ok(config)
    }
}

/// Read a context from a file path, `-` for stdin, or empty when absent.
pub fn read_context(source: Option<&str>) -> anyhow::Result<Context> {
    match source {
        None => Ok(Context::new()),
        Some("-") => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(Context::from_json_str(&buf)?)
        }
        Some(path) => Ok(Context::from_file(Path::new(path))?),
    }
}
