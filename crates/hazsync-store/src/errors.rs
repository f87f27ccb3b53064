//! Error types for the storage subsystem.
//!
//! [`StoreError`] is the primary error type returned by all store
//! operations. Domain-meaningful variants (`SessionNotActive`,
//! `VersionConflict`, `InvalidTransition`) carry enough context for the
//! engine layer to translate them into caller-facing results without
//! re-reading state.

use thiserror::Error;

use crate::sqlite::row_types::EntryRow;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested collaboration session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but is not in the `active` status.
    #[error("session {session_id} is {status}")]
    SessionNotActive {
        /// The session in question.
        session_id: String,
        /// Its current status string ("paused" or "ended").
        status: String,
    },

    /// Requested analysis entry was not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Requested analysis was not found in the directory.
    #[error("analysis not found: {0}")]
    AnalysisNotFound(String),

    /// Optimistic concurrency check failed; carries the current
    /// server-side entry so the caller can reconcile and retry.
    #[error("version conflict on entry {}: current version is {}", current.id, current.version)]
    VersionConflict {
        /// The entry as currently stored.
        current: Box<EntryRow>,
    },

    /// Illegal session status transition.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Internal error (e.g. poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_display() {
        let err = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn session_not_found_display() {
        let err = StoreError::SessionNotFound("csn_123".into());
        assert_eq!(err.to_string(), "session not found: csn_123");
    }

    #[test]
    fn session_not_active_display() {
        let err = StoreError::SessionNotActive {
            session_id: "csn_1".into(),
            status: "paused".into(),
        };
        assert_eq!(err.to_string(), "session csn_1 is paused");
    }

    #[test]
    fn invalid_transition_display() {
        let err = StoreError::InvalidTransition {
            from: "ended".into(),
            to: "active".into(),
        };
        assert_eq!(err.to_string(), "invalid session transition: ended -> active");
    }

    #[test]
    fn from_rusqlite_error() {
        let sqlite_err = rusqlite::Error::QueryReturnedNoRows;
        let err: StoreError = sqlite_err.into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn result_alias() {
        fn example() -> Result<i64> {
            Ok(42)
        }
        assert_eq!(example().unwrap(), 42);
    }
}
