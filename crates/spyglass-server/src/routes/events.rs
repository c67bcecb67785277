//! Paginated event retrieval.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use spyglass_core::{AgentEvent, EventType};
use spyglass_events::EventPage;

use crate::error::ApiError;
use crate::server::AppState;

/// Default page size when the query omits `limit`.
pub const DEFAULT_PAGE_SIZE: i64 = 50;
/// Hard cap on `limit`.
pub const MAX_PAGE_SIZE: i64 = 200;

/// Query string of `GET /api/sessions/{id}/events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Events to skip from the newest end.
    pub offset: Option<i64>,
    /// Page size, clamped to [`MAX_PAGE_SIZE`].
    pub limit: Option<i64>,
    /// Restrict to one event type (wire string, e.g. `tool_call`).
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

/// Response body: one newest-first page plus the total count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    /// The page, newest first.
    pub events: Vec<AgentEvent>,
    /// Total persisted events for the session (unfiltered).
    pub total: i64,
}

/// `GET /api/sessions/{id}/events?offset&limit&type`.
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let type_filter = match query.event_type.as_deref() {
        Some(raw) => Some(
            raw.parse::<EventType>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ),
        None => None,
    };

    let page = EventPage {
        offset: query.offset.unwrap_or(0).max(0),
        limit: query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE),
        type_filter,
    };

    let events = state.engine.list_events(&id, &page)?;
    let total = state.engine.count_events(&id)?;
    Ok(Json(EventsResponse { events, total }))
}
