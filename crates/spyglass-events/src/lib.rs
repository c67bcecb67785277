//! # spyglass-events
//!
//! Durable log for Spyglass sessions, backed by `SQLite`:
//!
//! - **Connection pool**: `r2d2` + `rusqlite` with WAL mode and foreign keys
//! - **Migrations**: version-tracked SQL schema embedded at compile time
//! - **Repositories**: stateless row-level operations over `&Connection`
//! - **`EventStore`**: the high-level, transactional store facade the engine
//!   talks to — append events, page them newest-first, replay them
//!   oldest-first, delete sessions with cascade
//!
//! The store is crash-consistent per call and implements no retry logic;
//! callers treat persistence as best-effort.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use errors::{EventStoreError, Result};
pub use store::{EventPage, EventStore, SessionSummary};
