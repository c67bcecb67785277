//! # spyglass-engine
//!
//! The session event-stream engine: the rules for how adapter-emitted
//! events become a persisted log, a bounded in-memory replay buffer, a live
//! multi-subscriber broadcast, and an incrementally maintained context
//! summary.
//!
//! - **[`RecentEventCache`]**: fixed-capacity, overwrite-oldest buffer used
//!   to backfill new subscribers without re-reading the log
//! - **[`ContextAggregate`]**: pure fold of the event stream into token
//!   usage, active skills/tool-servers, recent tools, and touched files
//! - **[`SessionRegistry`]**: session ID → live in-memory state, one lock
//!   per session — sessions never contend with each other
//! - **[`SessionEngine`]**: the delivery pipeline (cache → persist → fold →
//!   fan-out), subscriber backfill, and the session lifecycle
//!
//! Durability is best-effort by design: subscribers see an event before the
//! persistence queue drains it, so a crash in between loses the tail of the
//! log. The viewing experience wins over durability here.

#![deny(unsafe_code)]

pub mod adapter;
pub mod aggregate;
pub mod cache;
pub mod engine;
pub mod errors;
pub mod registry;
pub mod subscriber;

pub use adapter::{AdapterHandle, AdapterRegistry, AgentAdapter, EventSink};
pub use aggregate::{ContextAggregate, ToolStatus};
pub use cache::RecentEventCache;
pub use engine::{EngineConfig, SessionEngine};
pub use errors::{EngineError, Result};
pub use registry::SessionRegistry;
pub use subscriber::Subscriber;
