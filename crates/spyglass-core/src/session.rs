//! The session record and its lifecycle status machine.
//!
//! A [`Session`] exists in two places: the persistent store (source of
//! truth across restarts) and, while attached, the session registry's
//! in-memory copy (authoritative while live). The status machine is a set
//! of pure predicates on [`SessionStatus`] so lifecycle checks are plain
//! `match`es the compiler can see through.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::SessionId;

/// Lifecycle status of a session.
///
/// Transitions: `stopped → running` (start), `running → paused` (pause),
/// `paused → running` (resume), `running|paused → stopped` (stop), any
/// state → removed (delete). `Replay` marks a finished session being
/// re-viewed; nothing in the engine produces it, but it is a legal stored
/// value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Agent process attached and producing events.
    Running,
    /// Agent process attached but suspended.
    Paused,
    /// No agent process attached.
    Stopped,
    /// Finished session being replayed by a viewer.
    Replay,
}

impl SessionStatus {
    /// Wire string for this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Replay => "replay",
        }
    }

    /// Whether an agent instance is attached in this status.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// `start` is only legal from `stopped`.
    #[must_use]
    pub fn can_start(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// `pause` is only legal from `running`.
    #[must_use]
    pub fn can_pause(self) -> bool {
        matches!(self, Self::Running)
    }

    /// `resume` is only legal from `paused`.
    #[must_use]
    pub fn can_resume(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// `stop` is legal from `running` or `paused`.
    #[must_use]
    pub fn can_stop(self) -> bool {
        self.is_live()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            "replay" => Ok(Self::Replay),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unrecognized status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session status: {0}")]
pub struct UnknownStatus(pub String);

/// One tracked agent working-context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session ID.
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Working directory the agent runs in.
    pub working_dir: String,
    /// Adapter key selecting which agent tool drives this session.
    pub agent_type: String,
    /// Tokens used, rolled up from the event stream.
    pub tokens_used: u64,
    /// Context window limit, rolled up from the event stream.
    pub tokens_limit: u64,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 last-modified time.
    pub updated_at: String,
}

impl Session {
    /// Create a new `stopped` session with a fresh ID.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        working_dir: impl Into<String>,
        agent_type: impl Into<String>,
    ) -> Self {
        let now = crate::now_rfc3339();
        Self {
            id: SessionId::new(),
            name: name.into(),
            status: SessionStatus::Stopped,
            working_dir: working_dir.into(),
            agent_type: agent_type.into(),
            tokens_used: 0,
            tokens_limit: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Set a new status and refresh `updated_at`.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = crate::now_rfc3339();
    }

    /// Record new token usage and refresh `updated_at`.
    pub fn set_usage(&mut self, used: u64, limit: u64) {
        self.tokens_used = used;
        self.tokens_limit = limit;
        self.updated_at = crate::now_rfc3339();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
