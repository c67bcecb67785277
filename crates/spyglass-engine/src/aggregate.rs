//! The context aggregate — a derived rollup of a session's event stream.
//!
//! [`ContextAggregate::apply`] is a pure fold: current state plus one event
//! yields the next state, with no dependence on timing or other sessions.
//! Folding the full persisted log from the empty aggregate reproduces the
//! live in-memory aggregate exactly, which is how state is rebuilt after a
//! restart.

use serde::Serialize;
use serde_json::Value;
use spyglass_core::{AgentEvent, EventKind, TokenBreakdown};

/// Upper bound on the recent-tools list.
pub const MAX_RECENT_TOOLS: usize = 50;

/// Tools whose calls mark files as modified when the input names one.
pub const FILE_MUTATING_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// Current token usage as tracked by the aggregate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageState {
    /// Tokens currently in the context window.
    pub used: u64,
    /// Context window limit.
    pub limit: u64,
    /// Per-category breakdown.
    pub breakdown: TokenBreakdown,
}

/// One skill activation, in activation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedSkill {
    /// Skill name.
    pub name: String,
    /// Where the skill was loaded from.
    pub source: String,
    /// Tokens the skill added to the context.
    pub tokens: u64,
}

/// A tool-server the session has called, with the tools used on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerState {
    /// Server name.
    pub name: String,
    /// Tool names used on this server, in first-use order, deduplicated.
    pub tools: Vec<String>,
}

/// Status of a recorded tool invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Call seen, result not yet.
    Running,
    /// Result arrived without an error flag.
    Done,
    /// Result arrived flagged as an error.
    Error,
}

/// One entry in the recent-tools list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    /// Identifier shared between the call and its result.
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Current status, updated when the result arrives.
    pub status: ToolStatus,
    /// Timestamp of the originating call.
    pub timestamp: String,
}

/// Derived summary of a session's event stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAggregate {
    /// Token usage, replaced by `tokens` fields and `context_update` events.
    pub usage: TokenUsageState,
    /// Activated skills, append-only, duplicates allowed.
    pub skills: Vec<ActivatedSkill>,
    /// Tool-servers called, in first-use order.
    pub servers: Vec<McpServerState>,
    /// Recent tool invocations, most recent first, capped at
    /// [`MAX_RECENT_TOOLS`].
    pub recent_tools: Vec<ToolInvocation>,
    /// Paths touched by file-mutating tools, in first-touch order,
    /// deduplicated.
    pub modified_files: Vec<String>,
}

impl ContextAggregate {
    /// Fold one event into the aggregate.
    ///
    /// Returns `true` when the tracked token usage changed, so the caller
    /// can write the new numbers through to the session row.
    pub fn apply(&mut self, event: &AgentEvent) -> bool {
        let mut usage_changed = false;

        if let Some(tokens) = &event.tokens {
            self.usage = TokenUsageState {
                used: tokens.total,
                limit: tokens.limit,
                breakdown: tokens.breakdown.clone(),
            };
            usage_changed = true;
        }

        match &event.kind {
            EventKind::SkillActivated(payload) => {
                self.skills.push(ActivatedSkill {
                    name: payload.name.clone(),
                    source: payload.source.clone(),
                    tokens: payload.tokens,
                });
            }
            EventKind::McpCall(payload) => {
                match self.servers.iter_mut().find(|s| s.name == payload.server) {
                    Some(server) => {
                        if !server.tools.contains(&payload.tool) {
                            server.tools.push(payload.tool.clone());
                        }
                    }
                    None => self.servers.push(McpServerState {
                        name: payload.server.clone(),
                        tools: vec![payload.tool.clone()],
                    }),
                }
            }
            EventKind::ToolCall(payload) => {
                self.recent_tools.insert(
                    0,
                    ToolInvocation {
                        tool_call_id: payload.tool_call_id.clone(),
                        name: payload.name.clone(),
                        status: ToolStatus::Running,
                        timestamp: event.timestamp.clone(),
                    },
                );
                self.recent_tools.truncate(MAX_RECENT_TOOLS);

                if FILE_MUTATING_TOOLS.contains(&payload.name.as_str()) {
                    if let Some(path) = file_path_from_input(&payload.input) {
                        if !self.modified_files.iter().any(|p| p == path) {
                            self.modified_files.push(path.to_owned());
                        }
                    }
                }
            }
            EventKind::ToolResult(payload) => {
                // Most-recent-first order makes the first id match the
                // most recently recorded call. Results whose call has
                // already aged out of the list are ignored.
                if let Some(entry) = self
                    .recent_tools
                    .iter_mut()
                    .find(|t| t.tool_call_id == payload.tool_call_id)
                {
                    entry.status = if payload.is_error {
                        ToolStatus::Error
                    } else {
                        ToolStatus::Done
                    };
                }
            }
            // Authoritative over any tokens field on the same event.
            EventKind::ContextUpdate(payload) => {
                self.usage = TokenUsageState {
                    used: payload.total,
                    limit: payload.limit,
                    breakdown: payload.breakdown.clone(),
                };
                usage_changed = true;
            }
            EventKind::Message(_)
            | EventKind::Thinking(_)
            | EventKind::Error(_)
            | EventKind::LoopEvent(_) => {}
        }

        usage_changed
    }

    /// Rebuild an aggregate by folding an ordered event log from empty state.
    #[must_use]
    pub fn replay<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a AgentEvent>,
    {
        let mut aggregate = Self::default();
        for event in events {
            let _ = aggregate.apply(event);
        }
        aggregate
    }
}

/// Extract the mutated file path from a tool input, when present.
fn file_path_from_input(input: &Value) -> Option<&str> {
    input
        .get("file_path")
        .or_else(|| input.get("notebook_path"))
        .and_then(Value::as_str)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
