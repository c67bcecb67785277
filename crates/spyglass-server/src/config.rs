//! Server configuration with environment overrides.
//!
//! Override rules are strict-parse/ignore-invalid: a malformed or
//! out-of-range value in the environment is skipped and the existing value
//! kept, rather than failing startup.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for the Spyglass server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Interval between server-initiated WebSocket pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a WebSocket after this long without a pong, in seconds.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}

impl ServerConfig {
    /// Apply `SPYGLASS_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any name → value source (the environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SPYGLASS_HOST").filter(|v| !v.is_empty()) {
            self.host = v;
        }
        if let Some(v) = parse_in_range("SPYGLASS_PORT", lookup("SPYGLASS_PORT"), 1, 65535) {
            self.port = v;
        }
        if let Some(v) = parse_in_range(
            "SPYGLASS_HEARTBEAT_INTERVAL",
            lookup("SPYGLASS_HEARTBEAT_INTERVAL"),
            1,
            3600,
        ) {
            self.heartbeat_interval_secs = v;
        }
        if let Some(v) = parse_in_range(
            "SPYGLASS_HEARTBEAT_TIMEOUT",
            lookup("SPYGLASS_HEARTBEAT_TIMEOUT"),
            1,
            3600,
        ) {
            self.heartbeat_timeout_secs = v;
        }
    }
}

/// Strict parse with range check; anything else is logged and skipped.
fn parse_in_range<T>(name: &str, raw: Option<String>, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Copy,
{
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(v) if v >= min && v <= max => Some(v),
        _ => {
            debug!(name, raw, "ignoring invalid env override");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
