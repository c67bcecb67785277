//! # spyglass-core
//!
//! Foundation types shared by every Spyglass crate:
//!
//! - **Agent events**: the normalized, closed-set event vocabulary produced
//!   by adapters and consumed by the log, cache, aggregate, and push channel
//! - **Token accounting**: usage snapshots and per-category breakdowns
//! - **Branded IDs**: newtype wrappers so a session ID can never be passed
//!   where an event ID is expected
//! - **Sessions**: the session record and its lifecycle status machine

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod session;

pub use events::{
    AgentEvent, EventKind, EventType, TokenBreakdown, TokenUsage, EVENT_SCHEMA_VERSION,
};
pub use ids::{EventId, SessionId, SubscriberId};
pub use session::{Session, SessionStatus};

/// Current UTC time as an RFC 3339 string — the timestamp format used on
/// every event and session row.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
