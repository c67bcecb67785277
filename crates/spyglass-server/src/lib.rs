//! # spyglass-server
//!
//! The wire surface over the session engine:
//!
//! - **REST**: session CRUD and lifecycle, prompt submission, newest-first
//!   event pages, context snapshots
//! - **Push channel**: one WebSocket per viewer per session, delivering one
//!   JSON event object per message — cache backfill first, then live events
//! - **Operational**: `/health` and Prometheus `/metrics`
//!
//! Failed calls return a structured `{"error": {"code", "message"}}` body
//! with a non-2xx status. The push channel never closes because an event
//! failed to persist.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod ws;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{AppState, SpyglassServer};
