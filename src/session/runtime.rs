// src/session/runtime.rs — Per-session shared state and action dispatch
//
// Every mutation goes through `SessionRuntime::apply`, which holds the state
// mutex for the whole action (including the generation call), so a
// double-submitted regenerate and an ending action cannot interleave.

use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use super::state::{Action, EndReason, LastResult, SessionState, SessionView};
use crate::generation::{GenerationOptions, Generator};
use crate::infra::errors::PromptDoctorError;
use crate::render::{Context, Renderer};
use crate::store::VersionStore;

pub struct SessionRuntime {
    state: AsyncMutex<SessionState>,
    context: Context,
    options: GenerationOptions,
    renderer: Renderer,
    generator: Generator,
    store: Arc<VersionStore>,
    /// One-shot gate the coordinator waits on; fired by the ending transition.
    gate: Mutex<Option<oneshot::Sender<EndReason>>>,
}

impl SessionRuntime {
    pub(crate) fn new(
        state: SessionState,
        context: Context,
        options: GenerationOptions,
        renderer: Renderer,
        generator: Generator,
        store: Arc<VersionStore>,
        gate: oneshot::Sender<EndReason>,
    ) -> Self {
        Self {
            state: AsyncMutex::new(state),
            context,
            options,
            renderer,
            generator,
            store,
            gate: Mutex::new(Some(gate)),
        }
    }

    pub async fn view(&self) -> SessionView {
        self.state.lock().await.view(&self.context)
    }

    /// Render the current draft and call the generator once.
    ///
    /// Failures land in `last_result`; nothing is returned to the caller.
    pub(crate) async fn refresh(&self) {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await;
    }

    async fn refresh_locked(&self, state: &mut SessionState) {
        match self.renderer.render(&state.template_text, &self.context) {
            Ok(rendered) => {
                state.rendered_text = rendered;
                let result = self
                    .generator
                    .generate(&state.rendered_text, &self.options)
                    .await;
                state.last_result = Some(match result {
                    Ok(r) => LastResult::Generated(r),
                    Err(e) => LastResult::GenerationFailed(e),
                });
            }
            Err(e) => {
                tracing::debug!("Template for '{}' failed to render: {}", state.template_id, e);
                state.rendered_text.clear();
                state.last_result = Some(LastResult::TemplateFailed(e));
            }
        }
    }

    /// Apply one developer action and return the resulting view.
    pub async fn apply(&self, action: Action) -> Result<SessionView, PromptDoctorError> {
        let mut state = self.state.lock().await;
        if state.ended {
            return Err(PromptDoctorError::SessionClosed);
        }
        tracing::debug!("Session '{}': {}", state.template_id, action.name());

        match action {
            Action::Regenerate { template } => {
                state.template_text = template;
                state.regenerations += 1;
                self.refresh_locked(&mut state).await;
            }
            Action::SaveAndEnd { template } => {
                let text = template.unwrap_or_else(|| state.template_text.clone());
                let version = self.save(&state.template_id, text.clone()).await?;
                state.template_text = text;
                state.saved_version = Some(version);
                self.finish(&mut state, EndReason::Saved);
            }
            Action::DiscardAndEnd => {
                self.finish(&mut state, EndReason::Discarded);
            }
        }

        Ok(state.view(&self.context))
    }

    /// End without a developer action (timeout). Returns false if already ended.
    pub(crate) async fn abandon(&self) -> bool {
        let mut state = self.state.lock().await;
        let changed = state.end(EndReason::Discarded);
        let _ = self.gate_lock().take();
        changed
    }

    pub(crate) async fn last_result(&self) -> Option<LastResult> {
        self.state.lock().await.last_result.clone()
    }

    async fn save(&self, template_id: &str, text: String) -> Result<u32, PromptDoctorError> {
        let store = Arc::clone(&self.store);
        let id = template_id.to_string();
        tokio::task::spawn_blocking(move || store.save_version(&id, &text))
            .await
            .map_err(|e| anyhow::anyhow!("save task failed: {e}"))?
    }

    /// Commit the ending transition, then fire the gate.
    fn finish(&self, state: &mut SessionState, reason: EndReason) {
        if !state.end(reason) {
            return;
        }
        tracing::info!("Session '{}' ending: {:?}", state.template_id, reason);
        if let Some(gate) = self.gate_lock().take() {
            let _ = gate.send(reason);
        }
    }

    fn gate_lock(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<EndReason>>> {
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::generation::{
        GenerationBackend, GenerationMetadata, GenerationRequest, GenerationResult,
    };
    use crate::infra::errors::GenerationError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers "LLM Response #N" for the N-th call.
    pub(crate) struct CountingBackend {
        calls: AtomicU32,
    }

    impl CountingBackend {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for CountingBackend {
        fn id(&self) -> &str {
            "counting"
        }

        async fn complete(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResult, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(GenerationResult {
                content: format!("LLM Response #{n}"),
                metadata: GenerationMetadata {
                    model: request.model,
                    ..Default::default()
                },
            })
        }
    }

    pub(crate) fn runtime(
        store: Arc<VersionStore>,
        template: &str,
    ) -> (SessionRuntime, oneshot::Receiver<EndReason>) {
        let (tx, rx) = oneshot::channel();
        let context = Context::new().with("name", "Alice").with("age", 25);
        let rt = SessionRuntime::new(
            SessionState::new("greet", None, template.to_string()),
            context,
            GenerationOptions::default(),
            Renderer::default(),
            Generator::new(Arc::new(CountingBackend::new()), "mock-model"),
            store,
            tx,
        );
        (rt, rx)
    }

    fn store() -> (tempfile::TempDir, Arc<VersionStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VersionStore::open(dir.path()).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn test_regenerate_renders_and_generates() {
        let (_dir, store) = store();
        let (rt, _rx) = runtime(store, "seed");
        rt.refresh().await;

        let view = rt
            .apply(Action::Regenerate {
                template: "{{name}} is {{age}}.".into(),
            })
            .await
            .unwrap();
        assert_eq!(view.rendered_text, "Alice is 25.");
        assert_eq!(view.regenerations, 1);
        match view.last_result {
            Some(LastResult::Generated(ref r)) => assert_eq!(r.content, "LLM Response #2"),
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_template_captured_not_raised() {
        let (_dir, store) = store();
        let (rt, _rx) = runtime(store, "seed");
        let view = rt
            .apply(Action::Regenerate {
                template: "{% if %}".into(),
            })
            .await
            .unwrap();
        assert!(matches!(view.last_result, Some(LastResult::TemplateFailed(_))));
        assert!(view.rendered_text.is_empty());
        assert!(!view.ended);
    }

    #[tokio::test]
    async fn test_save_fires_gate_and_persists() {
        let (_dir, store) = store();
        let (rt, rx) = runtime(Arc::clone(&store), "seed");
        let view = rt
            .apply(Action::SaveAndEnd {
                template: Some("final".into()),
            })
            .await
            .unwrap();
        assert!(view.ended);
        assert_eq!(view.saved_version, Some(1));
        assert_eq!(rx.await.unwrap(), EndReason::Saved);
        assert_eq!(store.get_version("greet", 1).unwrap(), "final");
    }

    #[tokio::test]
    async fn test_save_without_template_uses_draft() {
        let (_dir, store) = store();
        let (rt, _rx) = runtime(Arc::clone(&store), "draft {{ name }}");
        rt.apply(Action::SaveAndEnd { template: None }).await.unwrap();
        assert_eq!(store.get_version("greet", 1).unwrap(), "draft {{ name }}");
    }

    #[tokio::test]
    async fn test_actions_after_end_are_rejected() {
        let (_dir, store) = store();
        let (rt, rx) = runtime(Arc::clone(&store), "seed");
        rt.apply(Action::DiscardAndEnd).await.unwrap();
        assert_eq!(rx.await.unwrap(), EndReason::Discarded);

        let err = rt
            .apply(Action::SaveAndEnd {
                template: Some("late".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PromptDoctorError::SessionClosed));
        assert!(store.list_versions("greet").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandon_ends_once() {
        let (_dir, store) = store();
        let (rt, _rx) = runtime(store, "seed");
        assert!(rt.abandon().await);
        assert!(!rt.abandon().await);
        assert!(rt.view().await.ended);
    }
}
