//! The normalized agent event model.
//!
//! [`AgentEvent`] is the one vocabulary every subsystem speaks: adapters
//! produce it, the log persists it, the cache replays it, the aggregate
//! folds it, and the push channel delivers it verbatim. Events are
//! immutable once created — they are only ever consumed.
//!
//! The payload is a closed sum type ([`EventKind`]) rather than opaque
//! JSON, so fold and broadcast logic match exhaustively and the compiler
//! flags any variant a consumer forgot. The wire format keeps the familiar
//! `{"type": "...", "data": {...}}` shape via adjacent tagging.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::ids::{EventId, SessionId};

/// Version of the event wire schema. Bump when a payload shape changes
/// incompatibly; persisted rows carry the version they were written with.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Token accounting
// ─────────────────────────────────────────────────────────────────────────────

/// Per-category token quantities.
///
/// `buffer` is reserved headroom, not an additive component — the sum of
/// the fields need not equal any usage total.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBreakdown {
    /// Tokens consumed by the system prompt.
    pub system: u64,
    /// Tokens consumed by activated skills.
    pub skills: u64,
    /// Tokens consumed by tool-server definitions.
    pub mcp: u64,
    /// Tokens consumed by conversation messages.
    pub messages: u64,
    /// Reserved headroom before the limit.
    pub buffer: u64,
}

/// Token usage snapshot attached to an event.
///
/// `total <= limit` is expected from well-behaved producers but is not
/// enforced here — the aggregate tracks whatever the adapter reports.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Tokens added by the step that produced this event.
    pub added: u64,
    /// Total tokens in the context window after this event.
    pub total: u64,
    /// Context window limit.
    pub limit: u64,
    /// Per-category breakdown.
    pub breakdown: TokenBreakdown,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event type discriminator
// ─────────────────────────────────────────────────────────────────────────────

/// Event type discriminator — the closed set of event kinds.
///
/// Serializes to the exact snake_case wire string (`"tool_call"`, …) used
/// by the persistence `type` column, the REST type filter, and the push
/// channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Conversation message (user, assistant, or system).
    Message,
    /// Tool invocation issued by the agent.
    ToolCall,
    /// Result of an earlier tool invocation.
    ToolResult,
    /// Extended-thinking content.
    Thinking,
    /// A skill was loaded into the agent's context.
    SkillActivated,
    /// A tool-server (MCP) tool was invoked.
    McpCall,
    /// Authoritative context/token usage report.
    ContextUpdate,
    /// Failure surfaced into the stream (adapter death, unparseable output).
    Error,
    /// Agent-loop lifecycle marker (turn start/end and the like).
    LoopEvent,
}

/// All event type variants, for exhaustive testing and filter validation.
pub const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::Message,
    EventType::ToolCall,
    EventType::ToolResult,
    EventType::Thinking,
    EventType::SkillActivated,
    EventType::McpCall,
    EventType::ContextUpdate,
    EventType::Error,
    EventType::LoopEvent,
];

impl EventType {
    /// The wire string for this type (`"tool_call"`, …).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Thinking => "thinking",
            Self::SkillActivated => "skill_activated",
            Self::McpCall => "mcp_call",
            Self::ContextUpdate => "context_update",
            Self::Error => "error",
            Self::LoopEvent => "loop_event",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_EVENT_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_owned()))
    }
}

/// Error returned when parsing an unrecognized event type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of a `message` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Message author: `"user"`, `"assistant"`, or `"system"`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Payload of a `tool_call` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    /// Identifier shared with the matching `tool_result`.
    pub tool_call_id: String,
    /// Tool name, e.g. `"Write"`.
    pub name: String,
    /// Tool input as reported by the agent.
    pub input: Value,
}

/// Payload of a `tool_result` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    /// Identifier of the originating `tool_call`.
    pub tool_call_id: String,
    /// Tool name, when the producer repeats it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the tool failed.
    pub is_error: bool,
    /// Result text, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Payload of a `thinking` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingPayload {
    /// Thinking text.
    pub text: String,
}

/// Payload of a `skill_activated` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillActivatedPayload {
    /// Skill name.
    pub name: String,
    /// Where the skill was loaded from (`"user"`, `"project"`, …).
    pub source: String,
    /// Tokens the skill added to the context.
    pub tokens: u64,
}

/// Payload of an `mcp_call` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpCallPayload {
    /// Tool-server name.
    pub server: String,
    /// Tool invoked on that server.
    pub tool: String,
}

/// Payload of a `context_update` event — the authoritative usage report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdatePayload {
    /// Total tokens in the context window.
    pub total: u64,
    /// Context window limit.
    pub limit: u64,
    /// Per-category breakdown.
    pub breakdown: TokenBreakdown,
}

/// Payload of an `error` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Human-readable failure description.
    pub message: String,
    /// Where the failure happened, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Payload of a `loop_event` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopEventPayload {
    /// Loop stage, e.g. `"turn_start"` or `"turn_end"`.
    pub stage: String,
    /// Turn number, when the stage is turn-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<u64>,
}

/// Closed sum of event payloads, adjacently tagged for the wire:
/// `{"type": "tool_call", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    /// Conversation message.
    Message(MessagePayload),
    /// Tool invocation.
    ToolCall(ToolCallPayload),
    /// Tool result.
    ToolResult(ToolResultPayload),
    /// Extended thinking.
    Thinking(ThinkingPayload),
    /// Skill activation.
    SkillActivated(SkillActivatedPayload),
    /// Tool-server call.
    McpCall(McpCallPayload),
    /// Authoritative usage report.
    ContextUpdate(ContextUpdatePayload),
    /// Stream-injected failure.
    Error(ErrorPayload),
    /// Agent-loop marker.
    LoopEvent(LoopEventPayload),
}

impl EventKind {
    /// The discriminator for this payload.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Message(_) => EventType::Message,
            Self::ToolCall(_) => EventType::ToolCall,
            Self::ToolResult(_) => EventType::ToolResult,
            Self::Thinking(_) => EventType::Thinking,
            Self::SkillActivated(_) => EventType::SkillActivated,
            Self::McpCall(_) => EventType::McpCall,
            Self::ContextUpdate(_) => EventType::ContextUpdate,
            Self::Error(_) => EventType::Error,
            Self::LoopEvent(_) => EventType::LoopEvent,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentEvent
// ─────────────────────────────────────────────────────────────────────────────

/// One immutable, typed, timestamped fact about agent activity in a session.
///
/// The producer does not guarantee monotonic timestamps; persisted order is
/// insertion order, tracked by the store's per-session sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    /// Unique event ID.
    pub id: EventId,
    /// Session this event belongs to.
    pub session_id: SessionId,
    /// RFC 3339 timestamp assigned at creation.
    pub timestamp: String,
    /// Typed payload, tagged on the wire as `type`/`data`.
    #[serde(flatten)]
    pub kind: EventKind,
    /// Token usage snapshot, when the producing step reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
}

impl AgentEvent {
    /// Create an event with a fresh ID and the current timestamp.
    #[must_use]
    pub fn new(session_id: SessionId, kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            session_id,
            timestamp: crate::now_rfc3339(),
            kind,
            tokens: None,
        }
    }

    /// Attach a token usage snapshot.
    #[must_use]
    pub fn with_tokens(mut self, tokens: TokenUsage) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Build an `error` event for injection into a session's stream.
    ///
    /// Adapter failures are reported this way — as ordinary events viewers
    /// see — rather than as engine-level errors.
    #[must_use]
    pub fn error(
        session_id: SessionId,
        message: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self::new(
            session_id,
            EventKind::Error(ErrorPayload {
                message: message.into(),
                context,
            }),
        )
    }

    /// The discriminator for this event's payload.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> AgentEvent {
        AgentEvent::new(
            SessionId::from("sess_1"),
            EventKind::ToolCall(ToolCallPayload {
                tool_call_id: "tc_1".into(),
                name: "Write".into(),
                input: serde_json::json!({"file_path": "a.ts", "content": "x"}),
            }),
        )
    }

    #[test]
    fn event_type_strings_are_exact() {
        let expected = [
            (EventType::Message, "message"),
            (EventType::ToolCall, "tool_call"),
            (EventType::ToolResult, "tool_result"),
            (EventType::Thinking, "thinking"),
            (EventType::SkillActivated, "skill_activated"),
            (EventType::McpCall, "mcp_call"),
            (EventType::ContextUpdate, "context_update"),
            (EventType::Error, "error"),
            (EventType::LoopEvent, "loop_event"),
        ];
        for (variant, s) in expected {
            assert_eq!(variant.as_str(), s);
            let json = serde_json::to_string(&variant).unwrap();
            assert_eq!(json, format!("\"{s}\""));
        }
    }

    #[test]
    fn event_type_from_str_roundtrip() {
        for &t in ALL_EVENT_TYPES {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
    }

    #[test]
    fn event_type_rejects_unknown() {
        let err = "not_a_type".parse::<EventType>().unwrap_err();
        assert_eq!(err, UnknownEventType("not_a_type".into()));
    }

    #[test]
    fn kind_maps_to_matching_type() {
        let kinds = [
            (
                EventKind::Message(MessagePayload {
                    role: "user".into(),
                    content: "hi".into(),
                }),
                EventType::Message,
            ),
            (
                EventKind::Thinking(ThinkingPayload { text: "hm".into() }),
                EventType::Thinking,
            ),
            (
                EventKind::McpCall(McpCallPayload {
                    server: "github".into(),
                    tool: "search".into(),
                }),
                EventType::McpCall,
            ),
            (
                EventKind::LoopEvent(LoopEventPayload {
                    stage: "turn_start".into(),
                    turn: Some(1),
                }),
                EventType::LoopEvent,
            ),
        ];
        for (kind, expected) in kinds {
            assert_eq!(kind.event_type(), expected);
        }
    }

    #[test]
    fn wire_shape_has_type_and_data_keys() {
        let event = sample_event();
        let val = serde_json::to_value(&event).unwrap();
        assert_eq!(val["type"], "tool_call");
        assert_eq!(val["data"]["toolCallId"], "tc_1");
        assert_eq!(val["data"]["name"], "Write");
        assert!(val.get("sessionId").is_some(), "camelCase sessionId");
        assert!(val.get("tokens").is_none(), "tokens omitted when None");
    }

    #[test]
    fn serde_roundtrip_all_kinds() {
        let kinds = vec![
            EventKind::Message(MessagePayload {
                role: "assistant".into(),
                content: "done".into(),
            }),
            EventKind::ToolCall(ToolCallPayload {
                tool_call_id: "tc_2".into(),
                name: "Bash".into(),
                input: serde_json::json!({"command": "ls"}),
            }),
            EventKind::ToolResult(ToolResultPayload {
                tool_call_id: "tc_2".into(),
                name: Some("Bash".into()),
                is_error: false,
                output: Some("a b c".into()),
            }),
            EventKind::Thinking(ThinkingPayload {
                text: "considering".into(),
            }),
            EventKind::SkillActivated(SkillActivatedPayload {
                name: "pdf".into(),
                source: "user".into(),
                tokens: 420,
            }),
            EventKind::McpCall(McpCallPayload {
                server: "linear".into(),
                tool: "create_issue".into(),
            }),
            EventKind::ContextUpdate(ContextUpdatePayload {
                total: 12_000,
                limit: 200_000,
                breakdown: TokenBreakdown {
                    system: 3000,
                    skills: 420,
                    mcp: 800,
                    messages: 7780,
                    buffer: 45_000,
                },
            }),
            EventKind::Error(ErrorPayload {
                message: "process exited".into(),
                context: Some("adapter".into()),
            }),
            EventKind::LoopEvent(LoopEventPayload {
                stage: "turn_end".into(),
                turn: Some(3),
            }),
        ];
        for kind in kinds {
            let event = AgentEvent::new(SessionId::from("sess_rt"), kind);
            let json = serde_json::to_string(&event).unwrap();
            let back: AgentEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event, "roundtrip failed for {json}");
        }
    }

    #[test]
    fn tokens_roundtrip_when_present() {
        let event = sample_event().with_tokens(TokenUsage {
            added: 120,
            total: 5120,
            limit: 200_000,
            breakdown: TokenBreakdown::default(),
        });
        let val = serde_json::to_value(&event).unwrap();
        assert_eq!(val["tokens"]["total"], 5120);
        let back: AgentEvent = serde_json::from_value(val).unwrap();
        assert_eq!(back.tokens.unwrap().added, 120);
    }

    #[test]
    fn error_factory_builds_error_kind() {
        let event = AgentEvent::error(
            SessionId::from("sess_e"),
            "agent process exited with code 1",
            Some("adapter".into()),
        );
        assert_eq!(event.event_type(), EventType::Error);
        match &event.kind {
            EventKind::Error(payload) => {
                assert_eq!(payload.message, "agent process exited with code 1");
                assert_eq!(payload.context.as_deref(), Some("adapter"));
            }
            other => panic!("expected error kind, got {other:?}"),
        }
    }

    #[test]
    fn new_event_has_fresh_id_and_timestamp() {
        let a = sample_event();
        let b = sample_event();
        assert_ne!(a.id, b.id);
        assert!(!a.timestamp.is_empty());
        assert!(a.timestamp.contains('T'));
    }

    #[test]
    fn breakdown_sum_is_not_tied_to_total() {
        // buffer is headroom, not an additive component
        let usage = TokenUsage {
            added: 0,
            total: 100,
            limit: 1000,
            breakdown: TokenBreakdown {
                system: 50,
                skills: 10,
                mcp: 5,
                messages: 35,
                buffer: 900,
            },
        };
        let sum = usage.breakdown.system
            + usage.breakdown.skills
            + usage.breakdown.mcp
            + usage.breakdown.messages;
        assert_eq!(sum, usage.total);
        assert_ne!(sum + usage.breakdown.buffer, usage.total);
    }
}
