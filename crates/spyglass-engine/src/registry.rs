//! The session registry — session ID → live in-memory state.
//!
//! One async `Mutex` per session serializes every mutation to that
//! session's state (cache push, aggregate fold, status change, subscriber
//! add/remove) into a single total order, while different sessions proceed
//! fully in parallel. The outer map lock is held only for lookups and
//! insert/remove, never across an await on session work.

use std::collections::HashMap;
use std::sync::Arc;

use spyglass_core::Session;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::adapter::AdapterHandle;
use crate::aggregate::ContextAggregate;
use crate::cache::RecentEventCache;
use crate::subscriber::Subscriber;

/// Everything the engine keeps in memory for an attached session.
///
/// Not persisted directly — always derivable from the session row plus a
/// replay of its event log.
pub struct SessionState {
    /// Authoritative copy of the session while attached. Written through
    /// to the store on change, never re-read while live.
    pub session: Session,
    /// Bounded replay buffer for new-subscriber backfill.
    pub cache: RecentEventCache,
    /// Derived context summary.
    pub aggregate: ContextAggregate,
    /// Live subscribers.
    pub subscribers: Vec<Subscriber>,
    /// Control handle of the running agent instance, when one is attached.
    pub adapter: Option<Box<dyn AdapterHandle>>,
}

impl SessionState {
    /// Fresh state for a session, with an empty cache and aggregate.
    #[must_use]
    pub fn new(session: Session, cache_capacity: usize) -> Self {
        Self {
            session,
            cache: RecentEventCache::new(cache_capacity),
            aggregate: ContextAggregate::default(),
            subscribers: Vec::new(),
            adapter: None,
        }
    }
}

/// A session's live state behind its serializing lock.
pub struct ActiveSession {
    state: Mutex<SessionState>,
}

impl ActiveSession {
    fn new(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Acquire this session's state lock.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }
}

/// Map of attached sessions. Explicitly owned and injected — never a
/// process-wide singleton — so tests and embedders can run independent
/// instances side by side.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<ActiveSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attached session.
    pub async fn get(&self, session_id: &str) -> Option<Arc<ActiveSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Insert freshly materialized state, unless another task got there
    /// first — the state already present wins, so two concurrent attaches
    /// converge on one copy.
    pub async fn insert_if_absent(
        &self,
        session_id: String,
        state: SessionState,
    ) -> Arc<ActiveSession> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(ActiveSession::new(state)))
            .clone()
    }

    /// Detach a session, returning its state handle for teardown.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<ActiveSession>> {
        self.sessions.write().await.remove(session_id)
    }

    /// Number of attached sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is attached.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// IDs of all attached sessions.
    pub async fn attached_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
