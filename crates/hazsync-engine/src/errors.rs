//! Engine error taxonomy.
//!
//! Every operation returns one of these as an explicit typed result —
//! nothing is swallowed at the API boundary. [`EngineError::VersionConflict`]
//! carries the current server-side entry so the caller can reconcile its
//! intended change against the fresh version and retry. Storage failure is
//! the only unrecoverable condition and is kept distinct from the domain
//! variants rather than masked as one.

use thiserror::Error;

use hazsync_store::{EntryRow, StoreError};

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller identity missing.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Caller lacks project access or sufficient role.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of record ("session", "analysis", "entry", "node", "user").
        kind: &'static str,
        /// The missing ID.
        id: String,
    },

    /// Malformed identifiers or missing required fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// State conflict: joining an ended/paused session, and similar.
    /// The message distinguishes "ended" from "paused" for client display.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency failure on an entry mutation. Carries the
    /// current server-side row for caller-driven reconciliation.
    #[error("version conflict on entry {}: current version is {}", current.id, current.version)]
    VersionConflict {
        /// The entry as currently stored.
        current: Box<EntryRow>,
    },

    /// Entry mutation attempted while the owning analysis is outside an
    /// editable status.
    #[error("analysis {analysis_id} is not editable (status: {status})")]
    AnalysisNotEditable {
        /// The gated analysis.
        analysis_id: String,
        /// Its current workflow status.
        status: String,
    },

    /// Illegal session status transition.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Storage failure — unrecoverable, never masked as a domain error.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl EngineError {
    /// Machine-readable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::Conflict(_) | EngineError::VersionConflict { .. } => "CONFLICT",
            EngineError::AnalysisNotEditable { .. } => "ANALYSIS_NOT_EDITABLE",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => EngineError::NotFound {
                kind: "session",
                id,
            },
            StoreError::EntryNotFound(id) => EngineError::NotFound { kind: "entry", id },
            StoreError::AnalysisNotFound(id) => EngineError::NotFound {
                kind: "analysis",
                id,
            },
            StoreError::SessionNotActive { session_id, status } => {
                EngineError::Conflict(format!("session {session_id} is {status}"))
            }
            StoreError::VersionConflict { current } => EngineError::VersionConflict { current },
            StoreError::InvalidTransition { from, to } => {
                EngineError::InvalidTransition { from, to }
            }
            other => EngineError::Storage(other),
        }
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
