//! High-level transactional `CollabStore` API.
//!
//! Composes repository operations into atomic, session-centric methods.
//! Every write method runs inside a single `SQLite` transaction — callers
//! never observe partial state. Risk-affecting entry writes recompute the
//! analysis aggregate inside the same transaction, so no reader sees a
//! stale aggregate next to a fresh entry.
//!
//! INVARIANT: session-scoped writes (join/leave/heartbeat/transition) are
//! serialized per-session via in-process mutex locks. Entry writes rely on
//! the atomic `WHERE version = ?` conditional update instead of locks, so
//! concurrent mutations to different entries never contend in-process.

use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, instrument};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use hazsync_core::status::SessionStatus;

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::directory::DirectoryRepo;
use crate::sqlite::repositories::entry::{CreateEntryOptions, EntryPatch, EntryRepo};
use crate::sqlite::repositories::participant::ParticipantRepo;
use crate::sqlite::repositories::session::{CreateSessionOptions, SessionRepo};
use crate::sqlite::row_types::{
    AnalysisRow, EntryRow, NodeRow, ParticipantRow, RiskAggregate, SessionRow, UserRow,
};

/// Result of joining a session: everything the presence UI needs in one
/// round trip.
#[derive(Clone, Debug)]
pub struct JoinResult {
    /// The joined session.
    pub session: SessionRow,
    /// The caller's (possibly reactivated) participant row.
    pub participant: ParticipantRow,
    /// Active participants ordered by `joined_at` ascending.
    pub roster: Vec<ParticipantRow>,
}

/// Result of leaving a session.
#[derive(Clone, Debug)]
pub struct LeaveResult {
    /// Whether this call actually closed an active row (false = already
    /// left; the operation is idempotent).
    pub left_now: bool,
    /// Active participants remaining after the leave.
    pub remaining_active: i64,
}

/// High-level `CollabStore` wrapping a connection pool and all repositories.
pub struct CollabStore {
    pool: ConnectionPool,
    global_write_lock: Mutex<()>,
    session_write_locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl CollabStore {
    const SQLITE_BUSY_MAX_RETRIES: u32 = 32;

    /// Create a new `CollabStore` over an existing pool. The schema must
    /// already be migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            global_write_lock: Mutex::new(()),
            session_write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open an in-memory store and run migrations (tests, demos).
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self::new(pool))
    }

    /// Open a file-backed store and run migrations.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self::new(pool))
    }

    /// Get the raw connection pool (for advanced/custom queries).
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Locking and retry plumbing
    // ─────────────────────────────────────────────────────────────────────

    fn lock_global_write(&self) -> Result<MutexGuard<'_, ()>> {
        self.global_write_lock
            .lock()
            .map_err(|_| StoreError::Internal("global write lock poisoned".into()))
    }

    fn acquire_session_write_lock(&self, session_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .session_write_locks
            .lock()
            .map_err(|_| StoreError::Internal("session lock map poisoned".into()))?;

        // Opportunistically prune dead weak refs when the map grows.
        if locks.len() > 128 {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(session_id).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        let lock = Arc::new(Mutex::new(()));
        let _ = locks.insert(session_id.to_string(), Arc::downgrade(&lock));
        Ok(lock)
    }

    fn with_session_write_lock<T>(
        &self,
        session_id: &str,
        f: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let session_lock = self.acquire_session_write_lock(session_id)?;
        let _guard = session_lock
            .lock()
            .map_err(|_| StoreError::Internal("session write lock poisoned".into()))?;
        self.retry_on_sqlite_busy(f)
    }

    fn with_global_write_lock<T>(&self, f: impl FnMut() -> Result<T>) -> Result<T> {
        let _guard = self.lock_global_write()?;
        self.retry_on_sqlite_busy(f)
    }

    /// Retry an operation on `SQLite` BUSY/LOCKED with linear backoff + jitter.
    ///
    /// Backoff: base = min(attempts * 10, 500) ms, jitter ±25% to prevent
    /// thundering herd when multiple writers contend on the same database.
    #[allow(clippy::unused_self)]
    fn retry_on_sqlite_busy<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0;

        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err)
                    if Self::is_sqlite_busy_or_locked(&err)
                        && attempts < Self::SQLITE_BUSY_MAX_RETRIES =>
                {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(500);
                    let jitter_range = base_ms / 4;
                    let jitter = if jitter_range > 0 {
                        rand::random::<u64>() % (jitter_range * 2 + 1)
                    } else {
                        0
                    };
                    let backoff_ms = base_ms.saturating_sub(jitter_range) + jitter;
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_sqlite_busy_or_locked(err: &StoreError) -> bool {
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => {
                matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
            }
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Return the active session for an analysis, creating one lazily if
    /// none exists. The boolean is `true` when this call created it.
    ///
    /// The partial unique index on `(analysis_id) WHERE status='active'`
    /// makes the create race-safe: a concurrent creator loses the insert
    /// and falls back to the winner's row.
    #[instrument(skip(self), fields(analysis_id, created_by))]
    pub fn get_or_create_active_session(
        &self,
        analysis_id: &str,
        created_by: &str,
        name: Option<&str>,
    ) -> Result<(SessionRow, bool)> {
        self.with_global_write_lock(|| {
            let conn = self.conn()?;
            if let Some(existing) = SessionRepo::get_active_for_analysis(&conn, analysis_id)? {
                return Ok((existing, false));
            }
            match SessionRepo::create(
                &conn,
                &CreateSessionOptions {
                    analysis_id,
                    name,
                    created_by,
                    notes: None,
                },
            ) {
                Ok(created) => {
                    debug!(session_id = %created.id, analysis_id, "collaboration session created");
                    Ok((created, true))
                }
                Err(StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, msg)))
                    if code.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // Lost the create race; the winner's row must exist now.
                    SessionRepo::get_active_for_analysis(&conn, analysis_id)?
                        .map(|row| (row, false))
                        .ok_or(StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, msg)))
                }
                Err(err) => Err(err),
            }
        })
    }

    /// Get session by ID.
    pub fn find_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::get_by_id(&conn, session_id)
    }

    /// All sessions for an analysis, most recent first.
    pub fn sessions_for_analysis(&self, analysis_id: &str) -> Result<Vec<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::list_for_analysis(&conn, analysis_id)
    }

    /// Transition a session to a new status, enforcing the legal-transition
    /// map (`active` ↔ `paused`, both → `ended`; `ended` is terminal).
    #[instrument(skip(self), fields(session_id, target = %target))]
    pub fn transition_session(
        &self,
        session_id: &str,
        target: SessionStatus,
    ) -> Result<SessionRow> {
        self.with_session_write_lock(session_id, || {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;

            let session = SessionRepo::get_by_id(&tx, session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
            let from = session
                .parsed_status()
                .map_err(|e| StoreError::Internal(e.to_string()))?;

            if !from.can_transition_to(target) {
                return Err(StoreError::InvalidTransition {
                    from: from.as_str().to_string(),
                    to: target.as_str().to_string(),
                });
            }

            let _ = SessionRepo::set_status(&tx, session_id, target)?;
            let updated = SessionRepo::get_by_id(&tx, session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
            tx.commit()?;

            debug!(session_id, from = %from, to = %target, "session transitioned");
            Ok(updated)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Presence
    // ─────────────────────────────────────────────────────────────────────

    /// Join (or rejoin) a session. Atomic: the status gate, the upsert,
    /// and the roster read happen in one transaction.
    #[instrument(skip(self, user_name, user_email), fields(session_id, user_id))]
    pub fn join_participant(
        &self,
        session_id: &str,
        user_id: &str,
        user_name: &str,
        user_email: &str,
    ) -> Result<JoinResult> {
        self.with_session_write_lock(session_id, || {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;

            let session = SessionRepo::get_by_id(&tx, session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
            let status = session
                .parsed_status()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            if status != SessionStatus::Active {
                return Err(StoreError::SessionNotActive {
                    session_id: session_id.to_string(),
                    status: status.as_str().to_string(),
                });
            }

            let participant =
                ParticipantRepo::upsert_join(&tx, session_id, user_id, user_name, user_email)?;
            let roster = ParticipantRepo::active_roster(&tx, session_id)?;
            tx.commit()?;

            debug!(session_id, user_id, roster_len = roster.len(), "participant joined");
            Ok(JoinResult {
                session,
                participant,
                roster,
            })
        })
    }

    /// Leave a session. Idempotent: leaving twice is not an error.
    #[instrument(skip(self), fields(session_id, user_id))]
    pub fn leave_participant(&self, session_id: &str, user_id: &str) -> Result<LeaveResult> {
        self.with_session_write_lock(session_id, || {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;

            let _ = SessionRepo::get_by_id(&tx, session_id)?
                .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
            let left_now = ParticipantRepo::mark_left(&tx, session_id, user_id)?;
            let remaining_active = ParticipantRepo::count_active(&tx, session_id)?;
            tx.commit()?;

            Ok(LeaveResult {
                left_now,
                remaining_active,
            })
        })
    }

    /// Refresh a participant's activity timestamp and optionally its
    /// cursor payload. Returns `false` when there is no active row to
    /// touch (left, evicted, or never joined).
    pub fn heartbeat_participant(
        &self,
        session_id: &str,
        user_id: &str,
        cursor_position: Option<&Value>,
    ) -> Result<bool> {
        self.with_session_write_lock(session_id, || {
            let conn = self.conn()?;
            ParticipantRepo::heartbeat(&conn, session_id, user_id, cursor_position)
        })
    }

    /// Active participants ordered by `joined_at` ascending.
    pub fn active_participants(&self, session_id: &str) -> Result<Vec<ParticipantRow>> {
        let conn = self.conn()?;
        ParticipantRepo::active_roster(&conn, session_id)
    }

    /// Get one participant row regardless of active state.
    pub fn find_participant(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRow>> {
        let conn = self.conn()?;
        ParticipantRepo::get(&conn, session_id, user_id)
    }

    /// Mark participants inactive whose `last_activity_at` predates
    /// `cutoff`. Returns the number evicted.
    pub fn evict_idle_participants(&self, cutoff: &str) -> Result<usize> {
        self.with_global_write_lock(|| {
            let conn = self.conn()?;
            ParticipantRepo::evict_idle(&conn, cutoff)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Entries
    // ─────────────────────────────────────────────────────────────────────

    /// Create an entry at version 1 and recompute the analysis aggregate
    /// in the same transaction.
    #[instrument(skip(self, opts), fields(analysis_id = opts.analysis_id, node_id = opts.node_id))]
    pub fn create_entry(&self, opts: &CreateEntryOptions<'_>) -> Result<(EntryRow, RiskAggregate)> {
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            let entry = EntryRepo::create(&tx, opts)?;
            let aggregate = EntryRepo::aggregate(&tx, opts.analysis_id)?;
            tx.commit()?;
            debug!(entry_id = %entry.id, "entry created");
            Ok((entry, aggregate))
        })
    }

    /// Get entry by ID.
    pub fn find_entry(&self, entry_id: &str) -> Result<Option<EntryRow>> {
        let conn = self.conn()?;
        EntryRepo::get_by_id(&conn, entry_id)
    }

    /// All entries for an analysis in creation order.
    pub fn list_entries(&self, analysis_id: &str) -> Result<Vec<EntryRow>> {
        let conn = self.conn()?;
        EntryRepo::list_for_analysis(&conn, analysis_id)
    }

    /// Version-checked update. On success returns the fresh row at
    /// `base_version + 1`. On a stale `base_version` returns
    /// [`StoreError::VersionConflict`] carrying the current row so the
    /// caller can reconcile and retry.
    #[instrument(skip(self, patch), fields(entry_id, base_version))]
    pub fn update_entry(
        &self,
        entry_id: &str,
        base_version: i64,
        patch: &EntryPatch,
        updated_by: &str,
    ) -> Result<EntryRow> {
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;

            let changed =
                EntryRepo::update_with_version(&tx, entry_id, base_version, patch, updated_by)?;
            if changed {
                let updated = EntryRepo::get_by_id(&tx, entry_id)?
                    .ok_or_else(|| StoreError::EntryNotFound(entry_id.to_string()))?;
                tx.commit()?;
                return Ok(updated);
            }

            // Zero rows: the entry is gone, or the version moved.
            match EntryRepo::get_by_id(&tx, entry_id)? {
                None => Err(StoreError::EntryNotFound(entry_id.to_string())),
                Some(current) => {
                    debug!(
                        entry_id,
                        base_version,
                        current_version = current.version,
                        "version conflict"
                    );
                    Err(StoreError::VersionConflict {
                        current: Box::new(current),
                    })
                }
            }
        })
    }

    /// Delete an entry; returns the deleted row (for the event payload)
    /// and the post-delete aggregate from the same transaction.
    #[instrument(skip(self), fields(entry_id))]
    pub fn delete_entry(&self, entry_id: &str) -> Result<(EntryRow, RiskAggregate)> {
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            let entry = EntryRepo::get_by_id(&tx, entry_id)?
                .ok_or_else(|| StoreError::EntryNotFound(entry_id.to_string()))?;
            let _ = EntryRepo::delete(&tx, entry_id)?;
            let aggregate = EntryRepo::aggregate(&tx, &entry.analysis_id)?;
            tx.commit()?;
            debug!(entry_id, "entry deleted");
            Ok((entry, aggregate))
        })
    }

    /// Write (or clear) an entry's risk fields and recompute the owning
    /// analysis's aggregate inside the same transaction, so no observer
    /// can see a stale aggregate next to the fresh entry.
    #[instrument(skip(self), fields(entry_id))]
    pub fn set_entry_risk(
        &self,
        entry_id: &str,
        severity: Option<u8>,
        likelihood: Option<u8>,
        risk_rank: Option<&str>,
        updated_by: &str,
    ) -> Result<(EntryRow, RiskAggregate)> {
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            let tx = conn.unchecked_transaction()?;
            let changed =
                EntryRepo::set_risk(&tx, entry_id, severity, likelihood, risk_rank, updated_by)?;
            if !changed {
                return Err(StoreError::EntryNotFound(entry_id.to_string()));
            }
            let entry = EntryRepo::get_by_id(&tx, entry_id)?
                .ok_or_else(|| StoreError::EntryNotFound(entry_id.to_string()))?;
            let aggregate = EntryRepo::aggregate(&tx, &entry.analysis_id)?;
            tx.commit()?;
            Ok((entry, aggregate))
        })
    }

    /// Recompute the derived aggregate on demand.
    pub fn risk_aggregate(&self, analysis_id: &str) -> Result<RiskAggregate> {
        let conn = self.conn()?;
        EntryRepo::aggregate(&conn, analysis_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Directory (external collaborator backing data)
    // ─────────────────────────────────────────────────────────────────────

    /// Insert or replace an analysis directory row.
    pub fn upsert_analysis(&self, row: &AnalysisRow) -> Result<()> {
        self.with_global_write_lock(|| {
            let conn = self.conn()?;
            DirectoryRepo::upsert_analysis(&conn, row)
        })
    }

    /// Get an analysis directory row.
    pub fn find_analysis(&self, analysis_id: &str) -> Result<Option<AnalysisRow>> {
        let conn = self.conn()?;
        DirectoryRepo::get_analysis(&conn, analysis_id)
    }

    /// Change an analysis's workflow status.
    pub fn set_analysis_status(&self, analysis_id: &str, status: &str) -> Result<bool> {
        self.with_global_write_lock(|| {
            let conn = self.conn()?;
            DirectoryRepo::set_analysis_status(&conn, analysis_id, status)
        })
    }

    /// Insert or replace a node directory row.
    pub fn upsert_node(&self, row: &NodeRow) -> Result<()> {
        self.with_global_write_lock(|| {
            let conn = self.conn()?;
            DirectoryRepo::upsert_node(&conn, row)
        })
    }

    /// Whether a node exists within a document.
    pub fn node_in_document(&self, node_id: &str, document_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        DirectoryRepo::node_in_document(&conn, node_id, document_id)
    }

    /// Insert or replace a user directory row.
    pub fn upsert_user(&self, row: &UserRow) -> Result<()> {
        self.with_global_write_lock(|| {
            let conn = self.conn()?;
            DirectoryRepo::upsert_user(&conn, row)
        })
    }

    /// Get a user directory row.
    pub fn find_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        let conn = self.conn()?;
        DirectoryRepo::get_user(&conn, user_id)
    }

    /// Grant (or update) a user's role on a project.
    pub fn add_project_member(&self, project_id: &str, user_id: &str, role: &str) -> Result<()> {
        self.with_global_write_lock(|| {
            let conn = self.conn()?;
            DirectoryRepo::add_project_member(&conn, project_id, user_id, role)
        })
    }

    /// A user's role on a project, or `None`.
    pub fn member_role(&self, project_id: &str, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        DirectoryRepo::member_role(&conn, project_id, user_id)
    }

    /// Run raw setup against a fresh connection. Test-support hook used by
    /// higher layers to seed fixtures.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        f(&conn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
