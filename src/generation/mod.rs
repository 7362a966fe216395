// src/generation/mod.rs — Generation adapter over a pluggable model backend

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::infra::errors::{GenerationError, PromptDoctorError};

/// Key that callers may not smuggle in through pass-through options.
const MESSAGES_KEY: &str = "messages";

/// A model backend. One call, one request: no retries at this layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn id(&self) -> &str;

    async fn complete(&self, request: GenerationRequest)
        -> Result<GenerationResult, GenerationError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// What the backend receives. Built only by [`Generator`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Per-session generation parameters.
///
/// Unknown keys are passed through to the backend (e.g. `top_p`), except
/// `messages`: the rendered template is the only model input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GenerationOptions {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PromptDoctorError> {
        if self.extra.contains_key(MESSAGES_KEY) {
            return Err(PromptDoctorError::MessagesOverride);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub id: Option<String>,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub metadata: GenerationMetadata,
}

/// Wraps rendered text into a single user message and calls the backend.
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn GenerationBackend>,
    default_model: String,
}

impl Generator {
    pub fn new(backend: Arc<dyn GenerationBackend>, default_model: impl Into<String>) -> Self {
        Self {
            backend,
            default_model: default_model.into(),
        }
    }

    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    pub async fn generate(
        &self,
        rendered: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResult, GenerationError> {
        if options.validate().is_err() {
            return Err(GenerationError::new(
                "options must not include a message list",
            ));
        }

        let request = GenerationRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: vec![Message::user(rendered)],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            extra: options.extra.clone(),
        };

        tracing::debug!(
            backend = self.backend.id(),
            model = %request.model,
            chars = rendered.len(),
            "Calling generation backend"
        );
        let result = self.backend.complete(request).await;
        if let Err(ref e) = result {
            tracing::warn!("Generation via '{}' failed: {}", self.backend.id(), e.cause);
        }
        result
    }
}
