//! `SessionEngine` — the delivery pipeline and session lifecycle.
//!
//! One event arriving for a session is, under that session's lock and in
//! this order: pushed into the recent-event cache, enqueued for the ordered
//! persistence writer, folded into the context aggregate, then serialized
//! once and fanned out to every subscriber. Persistence is best-effort —
//! a failed append is logged and delivery proceeds, so a crash between
//! fan-out and the writer draining loses the tail of the log.
//!
//! Events addressed to unknown or torn-down sessions are dropped silently;
//! `deliver` never faults toward the producer.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use spyglass_core::{AgentEvent, Session, SessionId, SessionStatus, SubscriberId};
use spyglass_events::{EventPage, EventStore, SessionSummary};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterRegistry, EventSink};
use crate::aggregate::ContextAggregate;
use crate::errors::{EngineError, Result};
use crate::registry::{ActiveSession, SessionRegistry, SessionState};
use crate::subscriber::Subscriber;

/// Engine tuning knobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Recent-event cache capacity per session.
    pub cache_capacity: usize,
    /// Maximum concurrently running agent instances.
    pub max_running: usize,
    /// Subscriber channel depth (raised to fit a full backfill if needed).
    pub subscriber_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            max_running: 8,
            subscriber_buffer: 256,
        }
    }
}

/// Live counters for the operational endpoints.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineStats {
    /// Sessions with in-memory state.
    pub attached_sessions: usize,
    /// Subscribers across all attached sessions.
    pub subscribers: usize,
    /// Running agent instances.
    pub running_agents: usize,
}

/// The session event-stream engine.
pub struct SessionEngine {
    store: Arc<EventStore>,
    registry: SessionRegistry,
    adapters: AdapterRegistry,
    config: EngineConfig,
    sink: EventSink,
    persist_tx: mpsc::UnboundedSender<AgentEvent>,
    running: AtomicUsize,
}

impl SessionEngine {
    /// Create an engine and spawn its two background loops: the ordered
    /// persistence writer and the adapter-sink intake.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<EventStore>, adapters: AdapterRegistry, config: EngineConfig) -> Arc<Self> {
        let (sink, mut intake_rx) = EventSink::channel();
        let (persist_tx, mut persist_rx) = mpsc::unbounded_channel::<AgentEvent>();

        let engine = Arc::new(Self {
            store: store.clone(),
            registry: SessionRegistry::new(),
            adapters,
            config,
            sink,
            persist_tx,
            running: AtomicUsize::new(0),
        });

        // Single writer keeps persisted order equal to delivery order,
        // across all sessions.
        let _ = tokio::spawn(async move {
            while let Some(event) = persist_rx.recv().await {
                if let Err(e) = store.append_event(&event) {
                    warn!(event_id = %event.id, error = %e, "failed to persist event");
                }
            }
            debug!("persistence writer exiting");
        });

        let weak = Arc::downgrade(&engine);
        let _ = tokio::spawn(async move {
            while let Some((session_id, event)) = intake_rx.recv().await {
                let Some(engine) = weak.upgrade() else { break };
                engine.deliver(&session_id, event).await;
            }
            debug!("event intake exiting");
        });

        engine
    }

    /// The handoff handle given to adapters.
    #[must_use]
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Agent types with a registered adapter.
    #[must_use]
    pub fn agent_types(&self) -> Vec<String> {
        self.adapters.agent_types()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Delivery
    // ─────────────────────────────────────────────────────────────────────

    /// Deliver one event into a session's stream.
    ///
    /// Never errors toward the producer: events for sessions that are not
    /// attached (unknown, or already torn down) are dropped.
    pub async fn deliver(&self, session_id: &SessionId, event: AgentEvent) {
        let Some(active) = self.registry.get(session_id.as_str()).await else {
            debug!(session_id = %session_id, "dropping event for unattached session");
            return;
        };
        let mut state = active.lock().await;

        // 1. cache
        state.cache.push(event.clone());

        // 2. persistence (ordered queue, fire-and-forget)
        if self.persist_tx.send(event.clone()).is_err() {
            warn!(session_id = %session_id, "persistence queue closed, event not persisted");
        }

        // 3. aggregate fold, with usage write-through
        if state.aggregate.apply(&event) {
            let used = state.aggregate.usage.used;
            let limit = state.aggregate.usage.limit;
            state.session.set_usage(used, limit);
            self.write_usage(&state.session);
        }

        // 4. fan-out, serialized once
        let json = match serde_json::to_string(&event) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "failed to serialize event");
                return;
            }
        };
        for subscriber in &state.subscribers {
            if !subscriber.send(json.clone()) {
                warn!(
                    session_id = %session_id,
                    subscriber_id = %subscriber.id(),
                    "failed to send event to subscriber"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────

    /// Attach a subscriber to a session's stream.
    ///
    /// The full cache snapshot (oldest first) is enqueued before the
    /// subscriber joins the live set, under the session lock — a subscriber
    /// never sees a live event ahead of its backfill and never misses one
    /// delivered to other subscribers meanwhile.
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(SubscriberId, mpsc::Receiver<Arc<String>>)> {
        let active = self.attach(session_id).await?;
        let mut state = active.lock().await;

        let buffer = self.config.subscriber_buffer.max(state.cache.capacity() * 2);
        let (subscriber, rx) = Subscriber::channel(buffer);

        for event in state.cache.snapshot() {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    let _ = subscriber.send(Arc::new(json));
                }
                Err(e) => warn!(event_id = %event.id, error = %e, "failed to serialize backfill event"),
            }
        }

        let subscriber_id = subscriber.id().clone();
        state.subscribers.push(subscriber);
        debug!(session_id, subscriber_id = %subscriber_id, "subscriber attached");
        Ok((subscriber_id, rx))
    }

    /// Detach a subscriber. A no-op for unknown sessions or IDs.
    pub async fn unsubscribe(&self, session_id: &str, subscriber_id: &SubscriberId) {
        if let Some(active) = self.registry.get(session_id).await {
            let mut state = active.lock().await;
            state.subscribers.retain(|s| s.id() != subscriber_id);
            debug!(session_id, subscriber_id = %subscriber_id, "subscriber detached");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Create and persist a new `stopped` session.
    pub async fn create_session(
        &self,
        name: &str,
        working_dir: &str,
        agent_type: &str,
    ) -> Result<Session> {
        let session = Session::new(name, working_dir, agent_type);
        self.store.create_session(&session)?;
        info!(session_id = %session.id, agent_type, "session created");
        Ok(session)
    }

    /// Current session record — the in-memory copy when attached, else the
    /// stored row.
    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        if let Some(active) = self.registry.get(session_id).await {
            return Ok(active.lock().await.session.clone());
        }
        Ok(self.store.get_session(session_id)?)
    }

    /// All sessions with rolled-up event counts.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.store.list_sessions()?)
    }

    /// Start the session's agent. Rejected when the agent type has no
    /// adapter, the session is not `stopped`, or the running limit is hit.
    pub async fn start(&self, session_id: &str) -> Result<Session> {
        let active = self.attach(session_id).await?;
        let mut state = active.lock().await;

        if !state.session.status.can_start() {
            return Err(EngineError::InvalidState(format!(
                "cannot start session in status {}",
                state.session.status
            )));
        }
        let adapter = self
            .adapters
            .get(&state.session.agent_type)
            .ok_or_else(|| EngineError::AdapterUnavailable(state.session.agent_type.clone()))?;

        if self.running.fetch_add(1, Ordering::SeqCst) >= self.config.max_running {
            let _ = self.running.fetch_sub(1, Ordering::SeqCst);
            return Err(EngineError::InvalidState(format!(
                "concurrent agent limit ({}) reached",
                self.config.max_running
            )));
        }

        let handle = match adapter.spawn(&state.session, self.sink.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        state.adapter = Some(handle);
        state.session.set_status(SessionStatus::Running);
        self.write_status(&state.session);
        info!(session_id, "session started");
        Ok(state.session.clone())
    }

    /// Pause the session's agent. Silently a no-op when no agent is
    /// attached or the session is not running.
    pub async fn pause(&self, session_id: &str) -> Result<Session> {
        let active = self.attach(session_id).await?;
        let mut state = active.lock().await;

        if state.adapter.is_some() && state.session.status.can_pause() {
            if let Some(handle) = state.adapter.as_mut() {
                handle.pause().await?;
            }
            state.session.set_status(SessionStatus::Paused);
            self.write_status(&state.session);
            info!(session_id, "session paused");
        } else {
            debug!(session_id, "pause ignored, no running agent attached");
        }
        Ok(state.session.clone())
    }

    /// Resume the session's agent. Silently a no-op when no agent is
    /// attached or the session is not paused.
    pub async fn resume(&self, session_id: &str) -> Result<Session> {
        let active = self.attach(session_id).await?;
        let mut state = active.lock().await;

        if state.adapter.is_some() && state.session.status.can_resume() {
            if let Some(handle) = state.adapter.as_mut() {
                handle.resume().await?;
            }
            state.session.set_status(SessionStatus::Running);
            self.write_status(&state.session);
            info!(session_id, "session resumed");
        } else {
            debug!(session_id, "resume ignored, no paused agent attached");
        }
        Ok(state.session.clone())
    }

    /// Stop the session's agent, releasing its resources before the
    /// session is considered stopped. A no-op when already stopped.
    pub async fn stop(&self, session_id: &str) -> Result<Session> {
        let active = self.attach(session_id).await?;
        let mut state = active.lock().await;
        self.release_adapter(&mut state, session_id).await;

        if state.session.status.can_stop() {
            state.session.set_status(SessionStatus::Stopped);
            self.write_status(&state.session);
            info!(session_id, "session stopped");
        }
        Ok(state.session.clone())
    }

    /// Delete a session: stop its agent, discard in-memory state, and
    /// remove the persisted session and its events. Irreversible; events
    /// still arriving for the ID are dropped.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let removed = self.registry.remove(session_id).await;
        if let Some(active) = &removed {
            let mut state = active.lock().await;
            self.release_adapter(&mut state, session_id).await;
            state.subscribers.clear();
        }

        let existed = self.store.delete_session(session_id)?;
        if !existed && removed.is_none() {
            return Err(EngineError::SessionNotFound(session_id.to_owned()));
        }
        info!(session_id, "session deleted");
        Ok(())
    }

    /// Forward a prompt to the session's agent. An error when no agent is
    /// attached — unlike pause/resume, a lost prompt must not be silent.
    pub async fn send_prompt(&self, session_id: &str, prompt: &str) -> Result<()> {
        let active = self.attach(session_id).await?;
        let mut state = active.lock().await;
        match state.adapter.as_mut() {
            Some(handle) => handle.send_prompt(prompt).await,
            None => Err(EngineError::InvalidState(
                "no agent attached to session".into(),
            )),
        }
    }

    /// Current context aggregate for a session, materializing it from the
    /// log if the session is not attached.
    pub async fn context(&self, session_id: &str) -> Result<ContextAggregate> {
        let active = self.attach(session_id).await?;
        let state = active.lock().await;
        Ok(state.aggregate.clone())
    }

    /// Newest-first page of a session's persisted events.
    pub fn list_events(
        &self,
        session_id: &str,
        page: &EventPage,
    ) -> Result<Vec<AgentEvent>> {
        Ok(self.store.list_events(session_id, page)?)
    }

    /// Number of persisted events for a session.
    pub fn count_events(&self, session_id: &str) -> Result<i64> {
        Ok(self.store.count_events(session_id)?)
    }

    /// Live counters for health reporting.
    pub async fn stats(&self) -> EngineStats {
        let mut subscribers = 0;
        for id in self.registry.attached_ids().await {
            if let Some(active) = self.registry.get(&id).await {
                subscribers += active.lock().await.subscribers.len();
            }
        }
        EngineStats {
            attached_sessions: self.registry.len().await,
            subscribers,
            running_agents: self.running.load(Ordering::SeqCst),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────

    /// Get the session's live state, materializing it from the store on
    /// first interaction: load the row, rebuild the aggregate by replaying
    /// the log, and seed the cache with the newest events.
    async fn attach(&self, session_id: &str) -> Result<Arc<ActiveSession>> {
        if let Some(active) = self.registry.get(session_id).await {
            return Ok(active);
        }

        let session = self.store.get_session(session_id)?;
        let events = self.store.events_for_replay(session_id)?;

        let mut state = SessionState::new(session, self.config.cache_capacity);
        state.aggregate = ContextAggregate::replay(&events);
        let skip = events.len().saturating_sub(self.config.cache_capacity);
        for event in events.into_iter().skip(skip) {
            state.cache.push(event);
        }

        debug!(session_id, "session state materialized");
        Ok(self
            .registry
            .insert_if_absent(session_id.to_owned(), state)
            .await)
    }

    /// Shut down and drop a live adapter handle, if any.
    async fn release_adapter(&self, state: &mut SessionState, session_id: &str) {
        if let Some(mut handle) = state.adapter.take() {
            if let Err(e) = handle.shutdown().await {
                warn!(session_id, error = %e, "adapter shutdown failed");
            }
            let _ = self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn write_status(&self, session: &Session) {
        match self
            .store
            .update_status(session.id.as_str(), session.status, &session.updated_at)
        {
            Ok(true) => {}
            Ok(false) => debug!(session_id = %session.id, "status write hit a deleted session"),
            Err(e) => warn!(session_id = %session.id, error = %e, "failed to persist status"),
        }
    }

    fn write_usage(&self, session: &Session) {
        match self.store.update_usage(
            session.id.as_str(),
            session.tokens_used,
            session.tokens_limit,
            &session.updated_at,
        ) {
            Ok(_) => {}
            Err(e) => warn!(session_id = %session.id, error = %e, "failed to persist usage"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
