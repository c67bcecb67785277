//! `/health` endpoint.

use serde::Serialize;
use spyglass_engine::engine::EngineStats;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current push-channel subscriber count.
    pub subscribers: usize,
    /// Sessions with live in-memory state.
    pub active_sessions: usize,
    /// Running agent instances.
    pub running_agents: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, stats: EngineStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        subscribers: stats.subscribers,
        active_sessions: stats.attached_sessions,
        running_agents: stats.running_agents,
    }
}
