// src/session/mod.rs — Review session coordinator
//
// A session runs in four steps:
//   1. load the latest template (or the seed), render it, generate once
//   2. serve the review page on a loopback port
//   3. park the caller on a one-shot gate until an ending action fires it
//   4. stop the listener, drain in-flight requests, return the last result
//
// The gate is fired only after the ending transition is committed, and the
// caller returns only after the server task has fully terminated.

pub mod runtime;
pub mod server;
pub mod state;
pub mod view;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::generation::{GenerationBackend, GenerationOptions, GenerationResult, Generator};
use crate::infra::config::{Config, ServerConfig};
use crate::infra::errors::{GenerationError, PromptDoctorError};
use crate::render::{Context, Renderer};
use crate::store::{validate_template_id, VersionStore};
pub use runtime::SessionRuntime;
pub use state::{Action, EndReason, LastResult, SessionState, SessionView};

/// Runs review sessions, one at a time.
///
/// Concurrent sessions need separate coordinators (each with its own port).
pub struct SessionCoordinator {
    store: Arc<VersionStore>,
    renderer: Renderer,
    generator: Generator,
    server: ServerConfig,
    active: Arc<AtomicBool>,
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<VersionStore>,
        renderer: Renderer,
        generator: Generator,
        server: ServerConfig,
    ) -> Self {
        Self {
            store,
            renderer,
            generator,
            server,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wire a coordinator from config around the given backend.
    pub fn from_config(
        config: &Config,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, PromptDoctorError> {
        config.server.socket_addr()?;
        let store = Arc::new(VersionStore::open(&config.store.dir)?);
        Ok(Self::new(
            store,
            Renderer::new(config.render.undefined),
            Generator::new(backend, config.generation.model.clone()),
            config.server.clone(),
        ))
    }

    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    pub fn opens_browser(&self) -> bool {
        self.server.open_browser
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run a full session and return the last generation outcome.
    ///
    /// Blocks (asynchronously) until the developer saves or discards. An
    /// error left in the session's last result is returned as `Err`.
    pub async fn start_session(
        &self,
        template_id: &str,
        context: Context,
        options: GenerationOptions,
    ) -> Result<GenerationResult, PromptDoctorError> {
        self.start_session_with_timeout(template_id, context, options, None)
            .await
    }

    pub async fn start_session_with_timeout(
        &self,
        template_id: &str,
        context: Context,
        options: GenerationOptions,
        timeout: Option<Duration>,
    ) -> Result<GenerationResult, PromptDoctorError> {
        let session = self.open(template_id, context, options).await?;
        if self.server.open_browser {
            if let Err(e) = open_browser(&session.url()) {
                tracing::warn!("Could not launch a browser for {}: {}", session.url(), e);
            }
        }
        session.wait_timeout(timeout).await
    }

    /// Initialize a session and start its service without waiting for it.
    pub async fn open(
        &self,
        template_id: &str,
        context: Context,
        options: GenerationOptions,
    ) -> Result<ActiveSession, PromptDoctorError> {
        let guard = ActiveGuard::acquire(&self.active)?;
        validate_template_id(template_id)?;
        options.validate()?;

        let draft = self.store.latest(template_id)?;
        if draft.is_seed() {
            tracing::info!("No saved versions of '{}'; starting from the seed", template_id);
        }

        let (gate_tx, gate_rx) = oneshot::channel();
        let runtime = Arc::new(SessionRuntime::new(
            SessionState::new(template_id, draft.version, draft.text),
            context,
            options,
            self.renderer.clone(),
            self.generator.clone(),
            Arc::clone(&self.store),
            gate_tx,
        ));

        // Bind before generating so a busy port fails without a wasted model call.
        let listener = tokio::net::TcpListener::bind(self.server.socket_addr()?).await?;
        let addr = listener.local_addr()?;

        runtime.refresh().await;
        let service = ServiceHandle::spawn(listener, server::build_router(Arc::clone(&runtime)));

        tracing::info!("Review session for '{}' listening on http://{}", template_id, addr);
        Ok(ActiveSession {
            addr,
            runtime,
            gate: gate_rx,
            service,
            _guard: guard,
        })
    }
}

/// A running session. Dropping it without waiting stops the service.
pub struct ActiveSession {
    addr: SocketAddr,
    runtime: Arc<SessionRuntime>,
    gate: oneshot::Receiver<EndReason>,
    service: ServiceHandle,
    _guard: ActiveGuard,
}

impl ActiveSession {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub async fn snapshot(&self) -> SessionView {
        self.runtime.view().await
    }

    /// Wait for the developer to end the session.
    pub async fn wait(self) -> Result<GenerationResult, PromptDoctorError> {
        self.wait_timeout(None).await
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, discarding edits.
    pub async fn wait_timeout(
        mut self,
        timeout: Option<Duration>,
    ) -> Result<GenerationResult, PromptDoctorError> {
        let ended = match timeout {
            None => Some((&mut self.gate).await),
            Some(limit) => tokio::time::timeout(limit, &mut self.gate).await.ok(),
        };

        let timed_out = match ended {
            Some(Ok(reason)) => {
                tracing::debug!("Session gate fired: {:?}", reason);
                None
            }
            // Sender dropped without firing: nothing can end the session anymore.
            Some(Err(_)) => None,
            None => {
                // An ending action may have landed just as the timer fired.
                if self.runtime.abandon().await {
                    timeout.map(|t| t.as_secs())
                } else {
                    None
                }
            }
        };

        self.service.stop().await;

        if let Some(secs) = timed_out {
            tracing::warn!("Review session timed out after {}s", secs);
            return Err(PromptDoctorError::SessionTimedOut { secs });
        }

        let outcome = match self.runtime.last_result().await {
            Some(result) => result.into_outcome(),
            None => Err(GenerationError::new("no generation was attempted").into()),
        };
        tracing::info!("Review session closed");
        outcome
    }
}

/// The spawned HTTP server plus its shutdown trigger.
struct ServiceHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServiceHandle {
    fn spawn(listener: tokio::net::TcpListener, router: axum::Router) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Review server exited with error: {}", e),
                Err(e) => tracing::warn!("Review server task failed: {}", e),
            }
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Holds a coordinator's single active-session slot.
struct ActiveGuard(Arc<AtomicBool>);

impl ActiveGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, PromptDoctorError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PromptDoctorError::SessionAlreadyActive)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Platform launcher for a review page URL.
fn browser_command(url: &str) -> std::io::Result<std::process::Command> {
    let (program, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("open", vec![url])
    } else if cfg!(target_os = "windows") {
        ("cmd", vec!["/C", "start", "", url])
    } else if cfg!(unix) {
        ("xdg-open", vec![url])
    } else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no known browser launcher on this platform",
        ));
    };
    let mut cmd = std::process::Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

/// Hand the review page to the desktop browser. Does not wait for it to open.
pub fn open_browser(url: &str) -> std::io::Result<()> {
    browser_command(url)?.spawn().map(drop)
}
