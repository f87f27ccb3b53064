//! Participant repository — presence rows for the `session_participants`
//! table.
//!
//! Identity is natural: `UNIQUE(session_id, user_id)`. Joins are upserts,
//! so concurrent joins by the same user are idempotent rather than
//! duplicative, and a rejoin reactivates the existing row instead of
//! inserting a second one.

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::sqlite::row_types::ParticipantRow;

/// Participant repository — stateless, every method takes `&Connection`.
pub struct ParticipantRepo;

impl ParticipantRepo {
    /// Insert or reactivate the participant row for `(session_id, user_id)`.
    ///
    /// On conflict the existing row keeps its original `joined_at`; only
    /// `is_active`, `left_at`, `last_activity_at`, and the denormalized
    /// identity fields are refreshed.
    pub fn upsert_join(
        conn: &Connection,
        session_id: &str,
        user_id: &str,
        user_name: &str,
        user_email: &str,
    ) -> Result<ParticipantRow> {
        let id = format!("prt_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO session_participants
               (id, session_id, user_id, user_name, user_email, joined_at, left_at, is_active, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 1, ?6)
             ON CONFLICT (session_id, user_id) DO UPDATE SET
               user_name = excluded.user_name,
               user_email = excluded.user_email,
               left_at = NULL,
               is_active = 1,
               last_activity_at = excluded.last_activity_at",
            params![id, session_id, user_id, user_name, user_email, now],
        )?;
        Self::get(conn, session_id, user_id)?.ok_or_else(|| {
            StoreError::Internal(format!(
                "participant row missing immediately after upsert: {session_id}/{user_id}"
            ))
        })
    }

    /// Get the participant row for `(session_id, user_id)`.
    pub fn get(
        conn: &Connection,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRow>> {
        let row = conn
            .query_row(
                "SELECT id, session_id, user_id, user_name, user_email, joined_at, left_at,
                        is_active, cursor_position, last_activity_at
                 FROM session_participants WHERE session_id = ?1 AND user_id = ?2",
                params![session_id, user_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Mark a participant as left. Returns `false` if there was no active
    /// row to close (already left, or never joined) — callers treat that
    /// as success, making leave idempotent.
    pub fn mark_left(conn: &Connection, session_id: &str, user_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE session_participants SET is_active = 0, left_at = ?1, last_activity_at = ?1
             WHERE session_id = ?2 AND user_id = ?3 AND is_active = 1",
            params![now, session_id, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Refresh `last_activity_at` and optionally replace the opaque cursor
    /// payload. Last write wins; no locking.
    pub fn heartbeat(
        conn: &Connection,
        session_id: &str,
        user_id: &str,
        cursor_position: Option<&Value>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = match cursor_position {
            Some(cursor) => conn.execute(
                "UPDATE session_participants SET last_activity_at = ?1, cursor_position = ?2
                 WHERE session_id = ?3 AND user_id = ?4 AND is_active = 1",
                params![now, cursor, session_id, user_id],
            )?,
            None => conn.execute(
                "UPDATE session_participants SET last_activity_at = ?1
                 WHERE session_id = ?2 AND user_id = ?3 AND is_active = 1",
                params![now, session_id, user_id],
            )?,
        };
        Ok(changed > 0)
    }

    /// Active participants for a session, ordered by `joined_at` ascending
    /// (id breaks timestamp ties deterministically).
    pub fn active_roster(conn: &Connection, session_id: &str) -> Result<Vec<ParticipantRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, user_id, user_name, user_email, joined_at, left_at,
                    is_active, cursor_position, last_activity_at
             FROM session_participants
             WHERE session_id = ?1 AND is_active = 1
             ORDER BY joined_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count active participants for a session.
    pub fn count_active(conn: &Connection, session_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM session_participants WHERE session_id = ?1 AND is_active = 1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark every participant inactive whose `last_activity_at` is older
    /// than `cutoff`. Rows are never deleted and `left_at` is untouched —
    /// the sweep only flips the active flag, so it can never corrupt an
    /// in-flight join or heartbeat for the same participant.
    pub fn evict_idle(conn: &Connection, cutoff: &str) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE session_participants SET is_active = 0
             WHERE is_active = 1 AND last_activity_at < ?1",
            params![cutoff],
        )?;
        Ok(changed)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
        Ok(ParticipantRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            user_id: row.get(2)?,
            user_name: row.get(3)?,
            user_email: row.get(4)?,
            joined_at: row.get(5)?,
            left_at: row.get(6)?,
            is_active: row.get(7)?,
            cursor_position: row.get(8)?,
            last_activity_at: row.get(9)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
