//! Adapter contracts — how external agent tools plug into the engine.
//!
//! An adapter owns the messy side: spawning an agent CLI, reading its
//! output, and normalizing it into [`AgentEvent`]s. The engine only sees
//! the trait surface here plus the [`EventSink`] handoff. Validating and
//! normalizing upstream output is the adapter's job; events arriving at the
//! sink are taken as already well-formed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use spyglass_core::{AgentEvent, Session, SessionId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::Result;

/// Asynchronous handoff from an adapter into the engine.
///
/// Cloneable and infallible from the producer's point of view: delivery
/// into a torn-down engine is silently dropped, mirroring how the engine
/// drops events for torn-down sessions.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<(SessionId, AgentEvent)>,
}

impl EventSink {
    /// Create a sink and the receiving end the engine's intake task drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(SessionId, AgentEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand one normalized event to the engine. Never errors.
    pub fn deliver(&self, session_id: SessionId, event: AgentEvent) {
        if self.tx.send((session_id, event)).is_err() {
            debug!("event sink closed, event dropped");
        }
    }
}

/// A registered agent tool integration.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// The agent-type key sessions select this adapter with.
    fn agent_type(&self) -> &str;

    /// Launch an agent instance for the session. Events flow back through
    /// the sink; the returned handle controls the running instance.
    async fn spawn(&self, session: &Session, sink: EventSink) -> Result<Box<dyn AdapterHandle>>;
}

/// Control surface for one running agent instance.
#[async_trait]
pub trait AdapterHandle: Send + Sync {
    /// Forward a user prompt to the agent.
    async fn send_prompt(&mut self, prompt: &str) -> Result<()>;

    /// Suspend the agent.
    async fn pause(&mut self) -> Result<()>;

    /// Resume a suspended agent.
    async fn resume(&mut self) -> Result<()>;

    /// Terminate the agent and release its resources.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Agent-type string → adapter implementation.
///
/// Injected into the engine at construction; `start` on a session whose
/// agent type has no entry here is rejected.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its agent type. A later registration for
    /// the same type replaces the earlier one.
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        let _ = self
            .adapters
            .insert(adapter.agent_type().to_owned(), adapter);
    }

    /// Look up the adapter for an agent type.
    #[must_use]
    pub fn get(&self, agent_type: &str) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.get(agent_type).cloned()
    }

    /// Registered agent types, sorted.
    #[must_use]
    pub fn agent_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.adapters.keys().cloned().collect();
        types.sort();
        types
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
