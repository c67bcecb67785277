//! Context summary retrieval.

use axum::Json;
use axum::extract::{Path, State};
use spyglass_engine::ContextAggregate;

use crate::error::ApiError;
use crate::server::AppState;

/// `GET /api/sessions/{id}/context` — the session's derived context
/// summary, rebuilt from the log if the session is not currently attached.
pub async fn get_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContextAggregate>, ApiError> {
    Ok(Json(state.engine.context(&id).await?))
}
