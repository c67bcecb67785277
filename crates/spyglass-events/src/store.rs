//! High-level transactional `EventStore` facade.
//!
//! Composes the repositories into session-centric operations. Write methods
//! run inside a single transaction — callers never observe partial state.
//! There is no retry logic here: each call either commits or returns the
//! error, and the caller decides what best-effort means.

use serde::Serialize;
use spyglass_core::{AgentEvent, Session, SessionStatus};

use crate::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::errors::Result;
use crate::migrations;
use crate::repositories::event::ListEventsOptions;
use crate::repositories::session::require_session;
use crate::repositories::{EventRepo, SessionRepo};

/// Options for a newest-first event page.
pub type EventPage = ListEventsOptions;

/// A session together with its rolled-up event count, as listed.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// The session record.
    #[serde(flatten)]
    pub session: Session,
    /// Number of persisted events.
    pub event_count: i64,
}

/// High-level store wrapping a connection pool and the repositories.
pub struct EventStore {
    pool: ConnectionPool,
}

impl EventStore {
    /// Create a store over an existing pool. The caller is responsible for
    /// having run migrations.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open an in-memory store and run migrations (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        let _ = migrations::run_migrations(&*pool.get()?)?;
        Ok(Self { pool })
    }

    /// Open a file-backed store and run migrations.
    pub fn open_file(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        let _ = migrations::run_migrations(&*pool.get()?)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Persist a newly created session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        SessionRepo::insert(&*self.conn()?, session)
    }

    /// Fetch one session, erroring when the ID is unknown.
    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        require_session(&*self.conn()?, session_id)
    }

    /// List all sessions, most recently updated first, with event counts.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let rows = SessionRepo::list_with_counts(&*self.conn()?)?;
        Ok(rows
            .into_iter()
            .map(|(session, event_count)| SessionSummary {
                session,
                event_count,
            })
            .collect())
    }

    /// Write a session's status. Returns `false` when the ID is unknown
    /// (the caller treats that as a stale write, not a fault).
    pub fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        updated_at: &str,
    ) -> Result<bool> {
        SessionRepo::update_status(&*self.conn()?, session_id, status, updated_at)
    }

    /// Write a session's rolled-up token usage.
    pub fn update_usage(
        &self,
        session_id: &str,
        tokens_used: u64,
        tokens_limit: u64,
        updated_at: &str,
    ) -> Result<bool> {
        SessionRepo::update_usage(&*self.conn()?, session_id, tokens_used, tokens_limit, updated_at)
    }

    /// Delete a session and, by cascade, its events. Returns `false` when
    /// the ID is unknown.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        SessionRepo::delete(&*self.conn()?, session_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    /// Append one event to its session's log, assigning the next sequence.
    ///
    /// Atomic: the existence check, sequence assignment, and insert happen
    /// in one transaction. Returns the assigned sequence.
    pub fn append_event(&self, event: &AgentEvent) -> Result<i64> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let _ = require_session(&tx, event.session_id.as_str())?;
        let sequence = EventRepo::next_sequence(&tx, event.session_id.as_str())?;
        EventRepo::insert(&tx, event, sequence)?;

        tx.commit()?;
        Ok(sequence)
    }

    /// Newest-first page of a session's events.
    pub fn list_events(&self, session_id: &str, page: &EventPage) -> Result<Vec<AgentEvent>> {
        let conn = self.conn()?;
        let _ = require_session(&conn, session_id)?;
        EventRepo::list_page(&conn, session_id, page)
    }

    /// Full log in insertion order, for rebuilding derived state.
    pub fn events_for_replay(&self, session_id: &str) -> Result<Vec<AgentEvent>> {
        EventRepo::list_for_replay(&*self.conn()?, session_id)
    }

    /// Number of persisted events for a session.
    pub fn count_events(&self, session_id: &str) -> Result<i64> {
        EventRepo::count(&*self.conn()?, session_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
