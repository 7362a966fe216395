// src/generation/openai.rs — OpenAI-compatible Chat Completions backend

use async_trait::async_trait;
use std::time::Duration;

use super::{
    GenerationBackend, GenerationMetadata, GenerationRequest, GenerationResult, Role, TokenUsage,
};
use crate::infra::config::GenerationConfig;
use crate::infra::errors::{GenerationError, PromptDoctorError};

pub struct OpenAiBackend {
    api_key: Option<String>,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build from config, reading the key from `api_key_env`.
    ///
    /// A missing key is only an error for the default OpenAI endpoint; local
    /// OpenAI-compatible servers usually run without one.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, PromptDoctorError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() && config.base_url.contains("api.openai.com") {
            return Err(PromptDoctorError::Config(format!(
                "{} is not set",
                config.api_key_env
            )));
        }
        Ok(Self::new(
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Request body in Chat Completions shape.
pub fn request_body(request: &GenerationRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            serde_json::json!({ "role": role, "content": m.content })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": request.model,
        "messages": messages,
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    for (key, value) in &request.extra {
        // Pass-through parameters never replace the core fields.
        if body.get(key).is_none() {
            body[key.as_str()] = value.clone();
        }
    }
    body
}

/// Extract content and metadata from a Chat Completions response.
pub fn parse_response(resp: &serde_json::Value) -> Result<GenerationResult, GenerationError> {
    let choice = resp["choices"]
        .get(0)
        .ok_or_else(|| GenerationError::new("response contained no choices"))?;

    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    Ok(GenerationResult {
        content,
        metadata: GenerationMetadata {
            id: resp["id"].as_str().map(String::from),
            model: resp["model"].as_str().unwrap_or("").to_string(),
            finish_reason: choice["finish_reason"].as_str().map(String::from),
            usage,
        },
    })
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn id(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let body = request_body(&request);

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GenerationError::new(format!("HTTP {status}: {error_body}")));
        }

        let resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::new(format!("Failed to parse response: {e}")))?;

        parse_response(&resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Message;
    use pretty_assertions::assert_eq;

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("Alice is 25.")],
            temperature: Some(0.0),
            max_tokens: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_request_body_single_user_message() {
        let body = request_body(&request());
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Alice is 25."}],
                "temperature": 0.0,
            })
        );
    }

    #[test]
    fn test_extra_params_cannot_replace_core_fields() {
        let mut req = request();
        req.extra.insert("top_p".into(), serde_json::json!(0.5));
        req.extra.insert("model".into(), serde_json::json!("other"));
        let body = request_body(&req);
        assert_eq!(body["top_p"], serde_json::json!(0.5));
        assert_eq!(body["model"], serde_json::json!("gpt-4o-mini"));
    }

    #[test]
    fn test_parse_response() {
        let resp = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": "LLM Response #1"}
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        });
        let result = parse_response(&resp).unwrap();
        assert_eq!(result.content, "LLM Response #1");
        assert_eq!(result.metadata.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(result.metadata.finish_reason.as_deref(), Some("stop"));
        assert_eq!(result.metadata.usage.total(), 16);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let resp = serde_json::json!({"error": {"message": "bad"}});
        assert!(parse_response(&resp).is_err());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let b = OpenAiBackend::new(None, "http://localhost:11434/v1/", Duration::from_secs(5));
        assert_eq!(b.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_generation_error() {
        // Port 9 (discard) on loopback is almost never listening.
        let b = OpenAiBackend::new(None, "http://127.0.0.1:9/v1", Duration::from_secs(2));
        let err = b.complete(request()).await.unwrap_err();
        assert!(!err.cause.is_empty());
    }
}
