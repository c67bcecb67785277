//! Error types for the engine.

use thiserror::Error;

/// Errors returned by engine operations.
///
/// `deliver` never returns these — events for unknown sessions are dropped,
/// not faulted. The variants map onto the caller-facing taxonomy: not-found,
/// invalid-state, unavailable adapter, and store failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation addressed an unknown session ID.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Operation is not legal in the session's current state.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// No adapter is registered for the requested agent type.
    #[error("no adapter registered for agent type: {0}")]
    AdapterUnavailable(String),

    /// The adapter failed to carry out a request.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] spyglass_events::EventStoreError),
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether this error means the addressed session does not exist,
    /// regardless of which layer noticed.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::Store(spyglass_events::EventStoreError::SessionNotFound(_))
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
