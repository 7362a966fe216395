// src/session/state.rs — Review session state and the action vocabulary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generation::GenerationResult;
use crate::infra::errors::{GenerationError, PromptDoctorError, TemplateError};
use crate::render::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Saved,
    Discarded,
}

/// Outcome of the most recent render + generate cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LastResult {
    Generated(GenerationResult),
    TemplateFailed(TemplateError),
    GenerationFailed(GenerationError),
}

impl LastResult {
    pub fn is_error(&self) -> bool {
        !matches!(self, LastResult::Generated(_))
    }

    /// What the blocked caller receives when the session closes.
    pub fn into_outcome(self) -> Result<GenerationResult, PromptDoctorError> {
        match self {
            LastResult::Generated(result) => Ok(result),
            LastResult::TemplateFailed(e) => Err(e.into()),
            LastResult::GenerationFailed(e) => Err(e.into()),
        }
    }
}

/// Developer actions accepted while a session awaits input.
///
/// Wire form: `{"action": "regenerate" | "saveAndEnd" | "discardAndEnd", "template": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    Regenerate {
        template: String,
    },
    /// `None` saves the current draft as-is.
    SaveAndEnd {
        #[serde(default)]
        template: Option<String>,
    },
    DiscardAndEnd,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Regenerate { .. } => "regenerate",
            Action::SaveAndEnd { .. } => "saveAndEnd",
            Action::DiscardAndEnd => "discardAndEnd",
        }
    }
}

/// Mutable record for one session. Owned by a single coordinator.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub template_id: String,
    /// Version the draft was loaded from; `None` for the seed.
    pub base_version: Option<u32>,
    pub template_text: String,
    pub rendered_text: String,
    pub last_result: Option<LastResult>,
    pub ended: bool,
    pub end_reason: Option<EndReason>,
    pub saved_version: Option<u32>,
    pub regenerations: u32,
    pub started_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(template_id: &str, base_version: Option<u32>, template_text: String) -> Self {
        Self {
            template_id: template_id.to_string(),
            base_version,
            template_text,
            rendered_text: String::new(),
            last_result: None,
            ended: false,
            end_reason: None,
            saved_version: None,
            regenerations: 0,
            started_at: Utc::now(),
        }
    }

    /// Mark the session ended. Only the first call has any effect.
    pub fn end(&mut self, reason: EndReason) -> bool {
        if self.ended {
            return false;
        }
        self.ended = true;
        self.end_reason = Some(reason);
        true
    }

    pub fn view(&self, context: &Context) -> SessionView {
        SessionView {
            template_id: self.template_id.clone(),
            base_version: self.base_version,
            template_text: self.template_text.clone(),
            rendered_text: self.rendered_text.clone(),
            last_result: self.last_result.clone(),
            context: context.clone(),
            ended: self.ended,
            end_reason: self.end_reason,
            saved_version: self.saved_version,
            regenerations: self.regenerations,
            started_at: self.started_at.to_rfc3339(),
        }
    }
}

/// Snapshot served to the view layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub template_id: String,
    pub base_version: Option<u32>,
    pub template_text: String,
    pub rendered_text: String,
    pub last_result: Option<LastResult>,
    pub context: Context,
    pub ended: bool,
    pub end_reason: Option<EndReason>,
    pub saved_version: Option<u32>,
    pub regenerations: u32,
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> Result<Action, serde_json::Error> {
        serde_json::from_value(body)
    }

    #[test]
    fn test_parse_regenerate() {
        let a = parse(json!({"action": "regenerate", "template": "{{ x }}"})).unwrap();
        assert_eq!(
            a,
            Action::Regenerate {
                template: "{{ x }}".into()
            }
        );
    }

    #[test]
    fn test_parse_save_with_and_without_template() {
        assert_eq!(
            parse(json!({"action": "saveAndEnd", "template": "T"})).unwrap(),
            Action::SaveAndEnd {
                template: Some("T".into())
            }
        );
        assert_eq!(
            parse(json!({"action": "saveAndEnd"})).unwrap(),
            Action::SaveAndEnd { template: None }
        );
        assert_eq!(
            parse(json!({"action": "saveAndEnd", "template": null})).unwrap(),
            Action::SaveAndEnd { template: None }
        );
    }

    #[test]
    fn test_parse_discard_ignores_template() {
        assert_eq!(
            parse(json!({"action": "discardAndEnd", "template": "x"})).unwrap(),
            Action::DiscardAndEnd
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = parse(json!({"action": "deleteEverything"})).unwrap_err();
        assert!(err.to_string().contains("deleteEverything"));
    }

    #[test]
    fn test_malformed_actions_rejected() {
        for body in [
            json!({}),
            json!({"action": 3}),
            json!({"action": "regenerate"}),
            json!({"action": "regenerate", "template": 5}),
            json!({"action": "save_and_end"}),
            json!("regenerate"),
        ] {
            assert!(parse(body.clone()).is_err(), "{body} should be rejected");
        }
    }

    #[test]
    fn test_end_is_set_once() {
        let mut s = SessionState::new("t", None, "x".into());
        assert!(s.end(EndReason::Saved));
        assert!(!s.end(EndReason::Discarded));
        assert_eq!(s.end_reason, Some(EndReason::Saved));
    }

    #[test]
    fn test_last_result_outcome() {
        let err = LastResult::TemplateFailed(TemplateError {
            message: "bad".into(),
            offset: None,
            line: None,
        });
        assert!(err.is_error());
        assert!(matches!(
            err.into_outcome(),
            Err(PromptDoctorError::Template(_))
        ));
    }

    #[test]
    fn test_last_result_serializes_with_kind_tag() {
        let r = LastResult::GenerationFailed(GenerationError::new("down"));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, json!({"kind": "generation_failed", "cause": "down"}));
    }
}
