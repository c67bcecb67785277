//! Scripted demo adapter.
//!
//! Stands in for a real CLI-spawning integration: each prompt plays a
//! canned turn of events (loop markers, thinking, a tool call and result,
//! an assistant message, a context update) through the sink, with small
//! delays so the stream looks live. Pause suspends playback between steps;
//! shutdown aborts it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use spyglass_core::events::{
    ContextUpdatePayload, LoopEventPayload, MessagePayload, ThinkingPayload, ToolCallPayload,
    ToolResultPayload,
};
use spyglass_core::{AgentEvent, EventKind, Session, SessionId, TokenBreakdown};
use spyglass_engine::adapter::{AdapterHandle, AgentAdapter, EventSink};
use spyglass_engine::Result;
use tokio::task::JoinHandle;
use tracing::debug;

/// Delay between scripted steps.
const STEP_DELAY: Duration = Duration::from_millis(120);

/// Adapter that plays a canned event sequence per prompt.
pub struct ScriptedAdapter;

#[async_trait]
impl AgentAdapter for ScriptedAdapter {
    fn agent_type(&self) -> &str {
        "scripted"
    }

    async fn spawn(&self, session: &Session, sink: EventSink) -> Result<Box<dyn AdapterHandle>> {
        debug!(session_id = %session.id, "scripted adapter attached");
        Ok(Box::new(ScriptedHandle {
            session_id: session.id.clone(),
            sink,
            paused: Arc::new(AtomicBool::new(false)),
            turn: AtomicU64::new(0),
            playback: None,
        }))
    }
}

/// Control handle for one scripted playback.
pub struct ScriptedHandle {
    session_id: SessionId,
    sink: EventSink,
    paused: Arc<AtomicBool>,
    turn: AtomicU64,
    playback: Option<JoinHandle<()>>,
}

#[async_trait]
impl AdapterHandle for ScriptedHandle {
    async fn send_prompt(&mut self, prompt: &str) -> Result<()> {
        let turn = self.turn.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = self.session_id.clone();
        let sink = self.sink.clone();
        let paused = self.paused.clone();
        let prompt = prompt.to_owned();

        if let Some(previous) = self.playback.take() {
            previous.abort();
        }
        self.playback = Some(tokio::spawn(async move {
            play_turn(&session_id, &sink, &paused, &prompt, turn).await;
        }));
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(playback) = self.playback.take() {
            playback.abort();
        }
        Ok(())
    }
}

async fn step(paused: &AtomicBool) {
    tokio::time::sleep(STEP_DELAY).await;
    while paused.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[allow(clippy::too_many_lines)]
async fn play_turn(
    session_id: &SessionId,
    sink: &EventSink,
    paused: &AtomicBool,
    prompt: &str,
    turn: u64,
) {
    let emit = |kind: EventKind| {
        sink.deliver(session_id.clone(), AgentEvent::new(session_id.clone(), kind));
    };

    emit(EventKind::Message(MessagePayload {
        role: "user".into(),
        content: prompt.to_owned(),
    }));
    emit(EventKind::LoopEvent(LoopEventPayload {
        stage: "turn_start".into(),
        turn: Some(turn),
    }));

    step(paused).await;
    emit(EventKind::Thinking(ThinkingPayload {
        text: format!("Working out how to handle: {prompt}"),
    }));

    step(paused).await;
    let tool_call_id = format!("tc_demo_{turn}");
    emit(EventKind::ToolCall(ToolCallPayload {
        tool_call_id: tool_call_id.clone(),
        name: "Write".into(),
        input: serde_json::json!({
            "file_path": format!("notes/turn-{turn}.md"),
            "content": "scripted output",
        }),
    }));

    step(paused).await;
    emit(EventKind::ToolResult(ToolResultPayload {
        tool_call_id,
        name: Some("Write".into()),
        is_error: false,
        output: Some("ok".into()),
    }));

    step(paused).await;
    emit(EventKind::Message(MessagePayload {
        role: "assistant".into(),
        content: format!("Done with turn {turn}."),
    }));

    step(paused).await;
    emit(EventKind::ContextUpdate(ContextUpdatePayload {
        total: 1500 * turn,
        limit: 200_000,
        breakdown: TokenBreakdown {
            system: 900,
            skills: 0,
            mcp: 0,
            messages: 600 * turn,
            buffer: 10_000,
        },
    }));
    emit(EventKind::LoopEvent(LoopEventPayload {
        stage: "turn_end".into(),
        turn: Some(turn),
    }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
