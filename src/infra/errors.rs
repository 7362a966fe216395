// src/infra/errors.rs — Error types for prompt-doctor

use serde::Serialize;
use thiserror::Error;

/// A template failed to parse or render.
///
/// Recoverable inside a review session: it is stored as the session's last
/// result and shown to the developer, who can fix the template and retry.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("Template error: {message}")]
pub struct TemplateError {
    pub message: String,
    /// Byte offset into the template source, when the engine reports one.
    pub offset: Option<usize>,
    pub line: Option<usize>,
}

/// The generation backend call failed (transport, HTTP status, or payload).
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("Generation failed: {cause}")]
pub struct GenerationError {
    pub cause: String,
}

impl GenerationError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PromptDoctorError {
    // In-session errors (recoverable, captured as session data)
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    // Store errors
    #[error("Template '{template_id}' has no version {version}")]
    NotFound { template_id: String, version: u32 },

    #[error("Invalid template id '{0}'")]
    InvalidTemplateId(String),

    #[error("Template store unavailable at {path}: {source}")]
    StoreUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template '{template_id}' has no version numbers left")]
    VersionsExhausted { template_id: String },

    // Service protocol errors
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Review session has already ended")]
    SessionClosed,

    // Caller misuse
    #[error("A review session is already active on this coordinator")]
    SessionAlreadyActive,

    #[error("Generation options must not override the message list; the rendered template is the only input")]
    MessagesOverride,

    #[error("Review session timed out after {secs}s")]
    SessionTimedOut { secs: u64 },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PromptDoctorError {
    /// Errors that end a `start_session` call instead of being shown in the page.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PromptDoctorError::Template(_)
                | PromptDoctorError::Generation(_)
                | PromptDoctorError::InvalidAction(_)
                | PromptDoctorError::SessionClosed
        )
    }

    pub(crate) fn store_unavailable(path: &std::path::Path, source: std::io::Error) -> Self {
        PromptDoctorError::StoreUnavailable {
            path: path.display().to_string(),
            source,
        }
    }
}
