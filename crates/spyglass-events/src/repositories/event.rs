//! Event repository — append-only log operations over the `events` table.
//!
//! Events are stored with the type discriminator denormalized into its own
//! column (for filtered pages) and the payload/tokens as JSON text. The
//! per-session `sequence` records insertion order — producer timestamps are
//! not trusted for ordering.

use rusqlite::{params, Connection, Row};
use serde_json::Value;
use spyglass_core::{AgentEvent, EventType, EVENT_SCHEMA_VERSION};

use crate::errors::Result;

/// Options for listing a page of events.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListEventsOptions {
    /// Number of events to skip.
    pub offset: i64,
    /// Maximum number of events to return.
    pub limit: i64,
    /// Restrict to a single event type.
    pub type_filter: Option<EventType>,
}

/// Event repository — stateless, every method takes `&Connection`.
pub struct EventRepo;

const EVENT_COLUMNS: &str = "id, session_id, sequence, type, timestamp, data, tokens";

impl EventRepo {
    /// Insert an event at the given sequence position.
    pub fn insert(conn: &Connection, event: &AgentEvent, sequence: i64) -> Result<()> {
        let (data, tokens) = serialize_payload(event)?;
        let _ = conn.execute(
            "INSERT INTO events (id, session_id, sequence, type, timestamp, schema_version, data, tokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id.as_str(),
                event.session_id.as_str(),
                sequence,
                event.event_type().as_str(),
                event.timestamp,
                EVENT_SCHEMA_VERSION,
                data,
                tokens,
            ],
        )?;
        Ok(())
    }

    /// Next sequence number for a session (1 for the first event).
    pub fn next_sequence(conn: &Connection, session_id: &str) -> Result<i64> {
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(sequence) FROM events WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0) + 1)
    }

    /// Page of events for a session, newest first.
    pub fn list_page(
        conn: &Connection,
        session_id: &str,
        opts: &ListEventsOptions,
    ) -> Result<Vec<AgentEvent>> {
        let rows = match opts.type_filter {
            Some(filter) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE session_id = ?1 AND type = ?2
                     ORDER BY sequence DESC LIMIT ?3 OFFSET ?4"
                ))?;
                stmt.query_map(
                    params![session_id, filter.as_str(), opts.limit, opts.offset],
                    Self::map_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE session_id = ?1
                     ORDER BY sequence DESC LIMIT ?2 OFFSET ?3"
                ))?;
                stmt.query_map(params![session_id, opts.limit, opts.offset], Self::map_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        rows.into_iter().map(deserialize_row).collect()
    }

    /// Full event log for a session in insertion order, for replay.
    pub fn list_for_replay(conn: &Connection, session_id: &str) -> Result<Vec<AgentEvent>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE session_id = ?1 ORDER BY sequence ASC"
        ))?;
        let rows = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(deserialize_row).collect()
    }

    /// Count events in a session.
    pub fn count(conn: &Connection, session_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<RawEventRow> {
        Ok(RawEventRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            event_type: row.get(3)?,
            timestamp: row.get(4)?,
            data: row.get(5)?,
            tokens: row.get(6)?,
        })
    }
}

/// Undecoded event row; payload columns are still JSON text.
struct RawEventRow {
    id: String,
    session_id: String,
    event_type: String,
    timestamp: String,
    data: String,
    tokens: Option<String>,
}

/// Split an event into its persisted payload columns.
fn serialize_payload(event: &AgentEvent) -> Result<(String, Option<String>)> {
    let tagged = serde_json::to_value(&event.kind)?;
    let data = tagged
        .get("data")
        .map_or_else(|| "{}".to_owned(), Value::to_string);
    let tokens = event
        .tokens
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    Ok((data, tokens))
}

/// Rebuild an [`AgentEvent`] from its persisted columns.
fn deserialize_row(row: RawEventRow) -> Result<AgentEvent> {
    let data: Value = serde_json::from_str(&row.data)?;
    let kind = serde_json::from_value(serde_json::json!({
        "type": row.event_type,
        "data": data,
    }))?;
    let tokens = row
        .tokens
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    Ok(AgentEvent {
        id: row.id.into(),
        session_id: row.session_id.into(),
        timestamp: row.timestamp,
        kind,
        tokens,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::repositories::SessionRepo;
    use spyglass_core::events::{MessagePayload, ToolCallPayload};
    use spyglass_core::{EventKind, Session, SessionId, TokenBreakdown, TokenUsage};

    fn open_with_session() -> (Connection, SessionId) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        let session = Session::new("demo", "/tmp", "mock");
        SessionRepo::insert(&conn, &session).unwrap();
        (conn, session.id)
    }

    fn message(session_id: &SessionId, content: &str) -> AgentEvent {
        AgentEvent::new(
            session_id.clone(),
            EventKind::Message(MessagePayload {
                role: "user".into(),
                content: content.into(),
            }),
        )
    }

    #[test]
    fn insert_and_replay_roundtrip() {
        let (conn, sid) = open_with_session();
        let event = message(&sid, "hello").with_tokens(TokenUsage {
            added: 5,
            total: 100,
            limit: 1000,
            breakdown: TokenBreakdown::default(),
        });
        EventRepo::insert(&conn, &event, 1).unwrap();

        let replayed = EventRepo::list_for_replay(&conn, sid.as_str()).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0], event);
    }

    #[test]
    fn next_sequence_starts_at_one() {
        let (conn, sid) = open_with_session();
        assert_eq!(EventRepo::next_sequence(&conn, sid.as_str()).unwrap(), 1);
        EventRepo::insert(&conn, &message(&sid, "a"), 1).unwrap();
        assert_eq!(EventRepo::next_sequence(&conn, sid.as_str()).unwrap(), 2);
    }

    #[test]
    fn replay_preserves_insertion_order() {
        let (conn, sid) = open_with_session();
        for (i, content) in ["first", "second", "third"].iter().enumerate() {
            let seq = i64::try_from(i).unwrap() + 1;
            EventRepo::insert(&conn, &message(&sid, content), seq).unwrap();
        }

        let replayed = EventRepo::list_for_replay(&conn, sid.as_str()).unwrap();
        let contents: Vec<_> = replayed
            .iter()
            .map(|e| match &e.kind {
                EventKind::Message(m) => m.content.as_str(),
                other => panic!("unexpected kind {other:?}"),
            })
            .collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn page_is_newest_first() {
        let (conn, sid) = open_with_session();
        for i in 1..=5 {
            EventRepo::insert(&conn, &message(&sid, &format!("m{i}")), i).unwrap();
        }

        let page = EventRepo::list_page(
            &conn,
            sid.as_str(),
            &ListEventsOptions {
                offset: 0,
                limit: 2,
                type_filter: None,
            },
        )
        .unwrap();
        let contents: Vec<_> = page
            .iter()
            .map(|e| match &e.kind {
                EventKind::Message(m) => m.content.as_str(),
                other => panic!("unexpected kind {other:?}"),
            })
            .collect();
        assert_eq!(contents, ["m5", "m4"]);
    }

    #[test]
    fn page_offset_skips_newest() {
        let (conn, sid) = open_with_session();
        for i in 1..=5 {
            EventRepo::insert(&conn, &message(&sid, &format!("m{i}")), i).unwrap();
        }

        let page = EventRepo::list_page(
            &conn,
            sid.as_str(),
            &ListEventsOptions {
                offset: 2,
                limit: 2,
                type_filter: None,
            },
        )
        .unwrap();
        let contents: Vec<_> = page
            .iter()
            .map(|e| match &e.kind {
                EventKind::Message(m) => m.content.as_str(),
                other => panic!("unexpected kind {other:?}"),
            })
            .collect();
        assert_eq!(contents, ["m3", "m2"]);
    }

    #[test]
    fn type_filter_restricts_page() {
        let (conn, sid) = open_with_session();
        EventRepo::insert(&conn, &message(&sid, "m1"), 1).unwrap();
        let call = AgentEvent::new(
            sid.clone(),
            EventKind::ToolCall(ToolCallPayload {
                tool_call_id: "tc_1".into(),
                name: "Bash".into(),
                input: serde_json::json!({"command": "ls"}),
            }),
        );
        EventRepo::insert(&conn, &call, 2).unwrap();
        EventRepo::insert(&conn, &message(&sid, "m2"), 3).unwrap();

        let page = EventRepo::list_page(
            &conn,
            sid.as_str(),
            &ListEventsOptions {
                offset: 0,
                limit: 10,
                type_filter: Some(EventType::ToolCall),
            },
        )
        .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0], call);
    }

    #[test]
    fn count_tracks_inserts() {
        let (conn, sid) = open_with_session();
        assert_eq!(EventRepo::count(&conn, sid.as_str()).unwrap(), 0);
        EventRepo::insert(&conn, &message(&sid, "a"), 1).unwrap();
        EventRepo::insert(&conn, &message(&sid, "b"), 2).unwrap();
        assert_eq!(EventRepo::count(&conn, sid.as_str()).unwrap(), 2);
    }

    #[test]
    fn unknown_session_yields_empty_results() {
        let (conn, _sid) = open_with_session();
        let replayed = EventRepo::list_for_replay(&conn, "sess_missing").unwrap();
        assert!(replayed.is_empty());
    }
}
