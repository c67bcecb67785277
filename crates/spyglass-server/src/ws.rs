//! The push channel — one WebSocket per viewer per session.
//!
//! Upgrade subscribes to the session's stream: the engine enqueues the
//! recent-event backfill before the subscriber goes live, so this module
//! only drains the channel in order. Each message is one JSON event object,
//! the same schema as the persisted event. Server-initiated pings detect
//! dead peers; a persistence failure upstream never closes the channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::server::AppState;

/// `GET /ws/{id}` — upgrade and stream the session's events.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, session_id, state))
}

/// Pong bookkeeping shared between the inbound and outbound halves.
struct Liveness {
    alive: AtomicBool,
    last_pong: Mutex<Instant>,
}

impl Liveness {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
        }
    }

    fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for the next heartbeat cycle.
    fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}

async fn run_ws(mut socket: WebSocket, session_id: String, state: AppState) {
    let (subscriber_id, mut rx) = match state.engine.subscribe(&session_id).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(session_id, error = %e, "rejecting push-channel attach");
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: e.to_string().into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    info!(session_id, subscriber_id = %subscriber_id, "viewer connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let liveness = Arc::new(Liveness::new());
    let ping_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);

    // Outbound forwarder: backfill and live events arrive on the same
    // channel, already ordered by the engine.
    let outbound_liveness = liveness.clone();
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !outbound_liveness.check_alive()
                        && outbound_liveness.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The push channel is one-way; inbound frames only feed liveness.
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Ping(_) | Message::Pong(_) => liveness.mark_alive(),
            Message::Close(_) => {
                debug!(session_id, "client sent close frame");
                break;
            }
            Message::Text(_) | Message::Binary(_) => {
                liveness.mark_alive();
                debug!(session_id, "ignoring client frame on push channel");
            }
        }
    }

    outbound.abort();
    state.engine.unsubscribe(&session_id, &subscriber_id).await;
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(session_id, subscriber_id = %subscriber_id, "viewer disconnected");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_starts_alive() {
        let liveness = Liveness::new();
        assert!(liveness.check_alive());
        // flag resets after the check
        assert!(!liveness.check_alive());
    }

    #[test]
    fn mark_alive_restores_flag_and_timestamp() {
        let liveness = Liveness::new();
        let _ = liveness.check_alive();
        std::thread::sleep(Duration::from_millis(5));
        liveness.mark_alive();
        assert!(liveness.check_alive());
        assert!(liveness.last_pong_elapsed() < Duration::from_secs(1));
    }
}
