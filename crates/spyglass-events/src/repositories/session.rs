//! Session repository — CRUD over the `sessions` table.

use rusqlite::{params, Connection, OptionalExtension, Row};
use spyglass_core::{Session, SessionStatus};

use crate::errors::{EventStoreError, Result};

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

const SESSION_COLUMNS: &str =
    "id, name, status, working_dir, agent_type, tokens_used, tokens_limit, created_at, updated_at";

impl SessionRepo {
    /// Insert a new session row.
    pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions (id, name, status, working_dir, agent_type,
                                   tokens_used, tokens_limit, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id.as_str(),
                session.name,
                session.status.as_str(),
                session.working_dir,
                session.agent_type,
                session.tokens_used,
                session.tokens_limit,
                session.created_at,
                session.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a single session by ID.
    pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
        let row = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List all sessions, most recently updated first, each with its
    /// rolled-up event count.
    pub fn list_with_counts(conn: &Connection) -> Result<Vec<(Session, i64)>> {
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.status, s.working_dir, s.agent_type,
                    s.tokens_used, s.tokens_limit, s.created_at, s.updated_at,
                    COUNT(e.id)
             FROM sessions s
             LEFT JOIN events e ON e.session_id = s.id
             GROUP BY s.id
             ORDER BY s.updated_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let session = Self::map_row(row)?;
                let count: i64 = row.get(9)?;
                Ok((session, count))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Update a session's status. Returns `false` when the ID is unknown.
    pub fn update_status(
        conn: &Connection,
        session_id: &str,
        status: SessionStatus,
        updated_at: &str,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![session_id, status.as_str(), updated_at],
        )?;
        Ok(changed > 0)
    }

    /// Update a session's rolled-up token usage. Returns `false` when the
    /// ID is unknown.
    pub fn update_usage(
        conn: &Connection,
        session_id: &str,
        tokens_used: u64,
        tokens_limit: u64,
        updated_at: &str,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET tokens_used = ?2, tokens_limit = ?3, updated_at = ?4 WHERE id = ?1",
            params![session_id, tokens_used, tokens_limit, updated_at],
        )?;
        Ok(changed > 0)
    }

    /// Delete a session row (events cascade). Returns `false` when the ID
    /// is unknown.
    pub fn delete(conn: &Connection, session_id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(changed > 0)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Session> {
        let status_str: String = row.get(2)?;
        let status: SessionStatus = status_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
        Ok(Session {
            id: row.get::<_, String>(0)?.into(),
            name: row.get(1)?,
            status,
            working_dir: row.get(3)?,
            agent_type: row.get(4)?,
            tokens_used: row.get(5)?,
            tokens_limit: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

/// Map a missing-session lookup into the dedicated error variant.
pub(crate) fn require_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Session> {
    SessionRepo::get_by_id(conn, session_id)?
        .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_owned()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
