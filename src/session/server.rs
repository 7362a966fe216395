// src/session/server.rs — Local HTTP surface for one review session

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

use super::runtime::SessionRuntime;
use super::state::{Action, SessionView};
use super::view;
use crate::infra::errors::PromptDoctorError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn error_response(err: PromptDoctorError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        PromptDoctorError::InvalidAction(_) => StatusCode::BAD_REQUEST,
        PromptDoctorError::SessionClosed => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::warn!("Action failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Build the router serving one session.
pub fn build_router(runtime: Arc<SessionRuntime>) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/api/session", get(get_session))
        .route("/api/action", post(submit_action))
        .route("/api/end", post(end_session))
        .route("/api/health", get(health))
        .with_state(runtime)
}

/// GET / — Review page.
async fn page(State(runtime): State<Arc<SessionRuntime>>) -> ApiResult<Html<String>> {
    let view = runtime.view().await;
    view::render_page(&view)
        .map(Html)
        .map_err(|e| error_response(anyhow::anyhow!("page render failed: {e}").into()))
}

/// GET /api/session — Current state as JSON.
async fn get_session(State(runtime): State<Arc<SessionRuntime>>) -> Json<SessionView> {
    Json(runtime.view().await)
}

/// POST /api/action — `{"action": "regenerate" | "saveAndEnd" | "discardAndEnd", "template"?: "..."}`
async fn submit_action(
    State(runtime): State<Arc<SessionRuntime>>,
    body: Result<Json<Action>, JsonRejection>,
) -> ApiResult<Json<SessionView>> {
    let Json(action) = body.map_err(|rejection| {
        error_response(PromptDoctorError::InvalidAction(rejection.body_text()))
    })?;
    runtime.apply(action).await.map(Json).map_err(error_response)
}

/// POST /api/end — Developer left without choosing; treated as discard.
async fn end_session(State(runtime): State<Arc<SessionRuntime>>) -> ApiResult<Json<SessionView>> {
    runtime
        .apply(Action::DiscardAndEnd)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/health — Simple health check.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::runtime::tests::runtime;
    use crate::store::VersionStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> (tempfile::TempDir, Arc<VersionStore>, Router) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(VersionStore::open(dir.path()).unwrap());
        let (rt, _rx) = runtime(Arc::clone(&store), "{{ name }}");
        (dir, store, build_router(Arc::new(rt)))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_dir, _store, app) = test_app();
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_page_served() {
        let (_dir, _store, app) = test_app();
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_session_state_endpoint() {
        let (_dir, _store, app) = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["template_id"], "greet");
        assert_eq!(json["template_text"], "{{ name }}");
        assert_eq!(json["ended"], false);
    }

    #[tokio::test]
    async fn test_unknown_action_is_bad_request() {
        let (_dir, _store, app) = test_app();
        let resp = app
            .oneshot(post_json("/api/action", serde_json::json!({"action": "explode"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("explode"));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_json_bad_request() {
        let (_dir, _store, app) = test_app();
        let bodies = [
            ("application/json", "{not json"),
            ("text/plain", r#"{"action": "discardAndEnd"}"#),
            ("application/json", r#"{"action": "regenerate"}"#),
        ];
        for (content_type, body) in bodies {
            let req = Request::builder()
                .method("POST")
                .uri("/api/action")
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
            let json = body_json(resp).await;
            assert!(json["error"].as_str().unwrap().starts_with("Invalid action"));
        }

        // Session still open after the rejections
        let resp = app
            .oneshot(Request::builder().uri("/api/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["ended"], false);
    }

    #[tokio::test]
    async fn test_regenerate_via_http() {
        let (_dir, _store, app) = test_app();
        let resp = app
            .oneshot(post_json(
                "/api/action",
                serde_json::json!({"action": "regenerate", "template": "{{name}} is {{age}}."}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["rendered_text"], "Alice is 25.");
        assert_eq!(json["last_result"]["kind"], "generated");
    }

    #[tokio::test]
    async fn test_end_then_action_conflicts() {
        let (_dir, store, app) = test_app();
        let resp = app
            .clone()
            .oneshot(post_json("/api/end", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["end_reason"], "discarded");

        let resp = app
            .oneshot(post_json(
                "/api/action",
                serde_json::json!({"action": "saveAndEnd", "template": "late"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(store.list_versions("greet").unwrap().is_empty());
    }
}
