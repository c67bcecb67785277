//! Session CRUD and lifecycle routes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use spyglass_core::Session;
use spyglass_events::SessionSummary;

use crate::error::ApiError;
use crate::server::AppState;

/// Body of `POST /api/sessions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Display name.
    pub name: String,
    /// Working directory for the agent.
    pub working_dir: String,
    /// Adapter key selecting the agent tool.
    pub agent_type: String,
}

/// Body of `POST /api/sessions/{id}/prompt`.
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    /// Prompt text forwarded to the agent.
    pub prompt: String,
}

/// `POST /api/sessions` — create a session.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("session name must not be empty".into()));
    }
    if req.agent_type.trim().is_empty() {
        return Err(ApiError::BadRequest("agent type must not be empty".into()));
    }
    let session = state
        .engine
        .create_session(&req.name, &req.working_dir, &req.agent_type)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /api/sessions` — list sessions with event counts.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    Ok(Json(state.engine.list_sessions()?))
}

/// `GET /api/sessions/{id}`.
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.engine.get_session(&id).await?))
}

/// `DELETE /api/sessions/{id}` — irreversible; cascades to events.
pub async fn delete_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/sessions/{id}/start`.
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.engine.start(&id).await?))
}

/// `POST /api/sessions/{id}/pause` — a no-op without a running agent.
pub async fn pause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.engine.pause(&id).await?))
}

/// `POST /api/sessions/{id}/resume` — a no-op without a paused agent.
pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.engine.resume(&id).await?))
}

/// `POST /api/sessions/{id}/stop`.
pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.engine.stop(&id).await?))
}

/// `POST /api/sessions/{id}/prompt`.
pub async fn prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PromptRequest>,
) -> Result<StatusCode, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }
    state.engine.send_prompt(&id, &req.prompt).await?;
    Ok(StatusCode::ACCEPTED)
}
