//! `SpyglassServer` — Axum HTTP + WebSocket server.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use spyglass_engine::SessionEngine;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::routes;
use crate::ws;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The session engine.
    pub engine: Arc<SessionEngine>,
    /// Server configuration.
    pub config: ServerConfig,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle, when the recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The Spyglass server.
pub struct SpyglassServer {
    config: ServerConfig,
    engine: Arc<SessionEngine>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl SpyglassServer {
    /// Create a new server over an engine.
    pub fn new(config: ServerConfig, engine: Arc<SessionEngine>) -> Self {
        Self {
            config,
            engine,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Attach a Prometheus render handle for `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route(
                "/api/sessions",
                post(routes::sessions::create).get(routes::sessions::list),
            )
            .route(
                "/api/sessions/{id}",
                get(routes::sessions::get_one).delete(routes::sessions::delete_one),
            )
            .route("/api/sessions/{id}/start", post(routes::sessions::start))
            .route("/api/sessions/{id}/pause", post(routes::sessions::pause))
            .route("/api/sessions/{id}/resume", post(routes::sessions::resume))
            .route("/api/sessions/{id}/stop", post(routes::sessions::stop))
            .route("/api/sessions/{id}/prompt", post(routes::sessions::prompt))
            .route("/api/sessions/{id}/events", get(routes::events::list))
            .route("/api/sessions/{id}/context", get(routes::context::get_context))
            .route("/ws/{id}", get(ws::ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Get the engine.
    pub fn engine(&self) -> &Arc<SessionEngine> {
        &self.engine
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.engine.stats().await;
    Json(health::health_check(state.start_time, stats))
}

/// GET /metrics — Prometheus text format, empty when no recorder is
/// installed.
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.as_ref().map(PrometheusHandle::render).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use spyglass_core::{Session, SessionStatus};
    use spyglass_engine::adapter::{AdapterHandle, AdapterRegistry, AgentAdapter, EventSink};
    use spyglass_engine::{EngineConfig, Result as EngineResult};
    use spyglass_events::EventStore;
    use tower::ServiceExt;

    struct StubAdapter;

    #[async_trait]
    impl AgentAdapter for StubAdapter {
        fn agent_type(&self) -> &str {
            "mock"
        }

        async fn spawn(
            &self,
            _session: &Session,
            _sink: EventSink,
        ) -> EngineResult<Box<dyn AdapterHandle>> {
            Ok(Box::new(StubHandle))
        }
    }

    struct StubHandle;

    #[async_trait]
    impl AdapterHandle for StubHandle {
        async fn send_prompt(&mut self, _prompt: &str) -> EngineResult<()> {
            Ok(())
        }
        async fn pause(&mut self) -> EngineResult<()> {
            Ok(())
        }
        async fn resume(&mut self) -> EngineResult<()> {
            Ok(())
        }
        async fn shutdown(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    fn make_server() -> SpyglassServer {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let mut adapters = AdapterRegistry::new();
        adapters.register(Arc::new(StubAdapter));
        let engine = SessionEngine::new(store, adapters, EngineConfig::default());
        SpyglassServer::new(ServerConfig::default(), engine)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn create_session(server: &SpyglassServer, agent_type: &str) -> String {
        let resp = server
            .router()
            .oneshot(post_json(
                "/api/sessions",
                serde_json::json!({
                    "name": "demo",
                    "workingDir": "/tmp/demo",
                    "agentType": agent_type,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await["id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let resp = server.router().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["subscribers"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_exists() {
        let server = make_server();
        let resp = server.router().oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_session_returns_201_with_record() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(post_json(
                "/api/sessions",
                serde_json::json!({
                    "name": "demo",
                    "workingDir": "/tmp/demo",
                    "agentType": "mock",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["name"], "demo");
        assert_eq!(parsed["status"], "stopped");
        assert_eq!(parsed["agentType"], "mock");
        assert!(parsed["id"].as_str().unwrap().starts_with("sess_"));
    }

    #[tokio::test]
    async fn create_with_empty_name_is_rejected() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(post_json(
                "/api/sessions",
                serde_json::json!({"name": "  ", "workingDir": "/tmp", "agentType": "mock"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn list_sessions_includes_event_count() {
        let server = make_server();
        let _ = create_session(&server, "mock").await;
        let resp = server
            .router()
            .oneshot(get_req("/api/sessions"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["eventCount"], 0);
    }

    #[tokio::test]
    async fn get_unknown_session_is_404_with_payload() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(get_req("/api/sessions/sess_missing"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["error"]["code"], "not_found");
        assert!(parsed["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let server = make_server();
        let id = create_session(&server, "mock").await;

        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/sessions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = server
            .router()
            .oneshot(get_req(&format!("/api/sessions/{id}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_transitions_to_running() {
        let server = make_server();
        let id = create_session(&server, "mock").await;
        let resp = server
            .router()
            .oneshot(post_json(
                &format!("/api/sessions/{id}/start"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], SessionStatus::Running.as_str());
    }

    #[tokio::test]
    async fn start_with_unknown_agent_type_is_400() {
        let server = make_server();
        let id = create_session(&server, "cursor").await;
        let resp = server
            .router()
            .oneshot(post_json(
                &format!("/api/sessions/{id}/start"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn double_start_is_conflict() {
        let server = make_server();
        let id = create_session(&server, "mock").await;
        let router = server.router();
        let resp = router
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{id}/start"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = router
            .oneshot(post_json(
                &format!("/api/sessions/{id}/start"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["error"]["code"], "invalid_state");
    }

    #[tokio::test]
    async fn prompt_without_agent_is_conflict() {
        let server = make_server();
        let id = create_session(&server, "mock").await;
        let resp = server
            .router()
            .oneshot(post_json(
                &format!("/api/sessions/{id}/prompt"),
                serde_json::json!({"prompt": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn prompt_with_agent_is_accepted() {
        let server = make_server();
        let id = create_session(&server, "mock").await;
        let router = server.router();
        let _ = router
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{id}/start"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        let resp = router
            .oneshot(post_json(
                &format!("/api/sessions/{id}/prompt"),
                serde_json::json!({"prompt": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn events_page_starts_empty() {
        let server = make_server();
        let id = create_session(&server, "mock").await;
        let resp = server
            .router()
            .oneshot(get_req(&format!("/api/sessions/{id}/events?limit=10")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["events"].as_array().unwrap().len(), 0);
        assert_eq!(parsed["total"], 0);
    }

    #[tokio::test]
    async fn events_with_invalid_type_filter_is_400() {
        let server = make_server();
        let id = create_session(&server, "mock").await;
        let resp = server
            .router()
            .oneshot(get_req(&format!("/api/sessions/{id}/events?type=bogus")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn context_endpoint_returns_empty_aggregate() {
        let server = make_server();
        let id = create_session(&server, "mock").await;
        let resp = server
            .router()
            .oneshot(get_req(&format!("/api/sessions/{id}/context")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["usage"]["used"], 0);
        assert_eq!(parsed["skills"].as_array().unwrap().len(), 0);
        assert_eq!(parsed["modifiedFiles"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(get_req("/ws/sess_any"))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(get_req("/nonexistent"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
