// src/render/mod.rs — Template rendering against a fixed context (minijinja)

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::Path;

use crate::infra::config::UndefinedPolicy;
use crate::infra::errors::{PromptDoctorError, TemplateError};
use crate::store::VersionStore;

/// Variables available to a template. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context(serde_json::Map<String, serde_json::Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any JSON value; only objects are accepted.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PromptDoctorError> {
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            other => Err(PromptDoctorError::Config(format!(
                "context must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, PromptDoctorError> {
        let value: serde_json::Value = serde_json::from_str(s)
            .map_err(|e| PromptDoctorError::Config(format!("invalid context JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_file(path: &Path) -> Result<Self, PromptDoctorError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Builder-style insert, for programmatic callers and tests.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Stateless renderer. Cheap to clone and safe to share across handlers.
#[derive(Clone)]
pub struct Renderer {
    env: Environment<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(UndefinedPolicy::default())
    }
}

impl Renderer {
    pub fn new(policy: UndefinedPolicy) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(match policy {
            UndefinedPolicy::Lenient => UndefinedBehavior::Lenient,
            UndefinedPolicy::Strict => UndefinedBehavior::Strict,
        });
        Self { env }
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<String, TemplateError> {
        self.env
            .render_str(template, minijinja::Value::from_serialize(context))
            .map_err(template_error)
    }

    /// Render a persisted version. `None` renders the latest (or the seed).
    pub fn render_stored(
        &self,
        store: &VersionStore,
        template_id: &str,
        version: Option<u32>,
        context: &Context,
    ) -> Result<String, PromptDoctorError> {
        let text = match version {
            Some(v) => store.get_version(template_id, v)?,
            None => store.latest(template_id)?.text,
        };
        Ok(self.render(&text, context)?)
    }
}

fn template_error(err: minijinja::Error) -> TemplateError {
    TemplateError {
        message: err.to_string(),
        offset: err.range().map(|r| r.start),
        line: err.line(),
    }
}
