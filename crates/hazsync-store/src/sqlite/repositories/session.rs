//! Collaboration session repository — lifecycle rows for the
//! `collaboration_sessions` table.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use hazsync_core::status::SessionStatus;

use crate::errors::Result;
use crate::sqlite::row_types::SessionRow;

/// Options for creating a new session.
pub struct CreateSessionOptions<'a> {
    /// Analysis the session collaborates on.
    pub analysis_id: &'a str,
    /// Optional display name.
    pub name: Option<&'a str>,
    /// Creating user.
    pub created_by: &'a str,
    /// Free-form notes.
    pub notes: Option<&'a str>,
}

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Create a new active session.
    pub fn create(conn: &Connection, opts: &CreateSessionOptions<'_>) -> Result<SessionRow> {
        let id = format!("csn_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO collaboration_sessions (id, analysis_id, name, status, created_by, created_at, updated_at, notes)
             VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?6, ?7)",
            params![id, opts.analysis_id, opts.name, opts.created_by, now, now, opts.notes],
        )?;
        Ok(SessionRow {
            id,
            analysis_id: opts.analysis_id.to_string(),
            name: opts.name.map(String::from),
            status: SessionStatus::Active.as_str().to_string(),
            created_by: opts.created_by.to_string(),
            created_at: now.clone(),
            updated_at: now,
            ended_at: None,
            notes: opts.notes.map(String::from),
        })
    }

    /// Get session by ID.
    pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT id, analysis_id, name, status, created_by, created_at, updated_at, ended_at, notes
                 FROM collaboration_sessions WHERE id = ?1",
                params![session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get the active session for an analysis, if any. The partial unique
    /// index guarantees at most one.
    pub fn get_active_for_analysis(
        conn: &Connection,
        analysis_id: &str,
    ) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT id, analysis_id, name, status, created_by, created_at, updated_at, ended_at, notes
                 FROM collaboration_sessions WHERE analysis_id = ?1 AND status = 'active'",
                params![analysis_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List every session for an analysis, most recent first.
    pub fn list_for_analysis(conn: &Connection, analysis_id: &str) -> Result<Vec<SessionRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, analysis_id, name, status, created_by, created_at, updated_at, ended_at, notes
             FROM collaboration_sessions WHERE analysis_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![analysis_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Write a new status. Stamps `updated_at`, and `ended_at` when the
    /// target is `Ended`. Legality of the transition is checked by the
    /// caller, which holds the row inside the same transaction.
    pub fn set_status(
        conn: &Connection,
        session_id: &str,
        target: SessionStatus,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = if target == SessionStatus::Ended {
            conn.execute(
                "UPDATE collaboration_sessions SET status = ?1, updated_at = ?2, ended_at = ?2 WHERE id = ?3",
                params![target.as_str(), now, session_id],
            )?
        } else {
            conn.execute(
                "UPDATE collaboration_sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![target.as_str(), now, session_id],
            )?
        };
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
        Ok(SessionRow {
            id: row.get(0)?,
            analysis_id: row.get(1)?,
            name: row.get(2)?,
            status: row.get(3)?,
            created_by: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            ended_at: row.get(7)?,
            notes: row.get(8)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
