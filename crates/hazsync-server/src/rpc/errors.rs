//! RPC error codes and error type.
//!
//! Handler failures carry a machine-readable code; engine errors map onto
//! the wire taxonomy without losing structure — a version conflict keeps
//! the current entry snapshot in `details` so clients can reconcile.

use hazsync_engine::EngineError;

use crate::rpc::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Generic not-found.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Caller identity missing.
pub const AUTHENTICATION_REQUIRED: &str = "AUTHENTICATION_REQUIRED";
/// No project access or insufficient role.
pub const FORBIDDEN: &str = "FORBIDDEN";
/// Malformed identifiers or missing required fields.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
/// State conflict (joining ended/paused session; version mismatch).
pub const CONFLICT: &str = "CONFLICT";
/// Mutation attempted outside the editable analysis status.
pub const ANALYSIS_NOT_EDITABLE: &str = "ANALYSIS_NOT_EDITABLE";
/// Illegal session status transition.
pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";

/// RPC error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Domain error with an explicit code and optional details.
    #[error("{message}")]
    Domain {
        /// Machine-readable code.
        code: &'static str,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        details: Option<serde_json::Value>,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::Domain { code, .. } => code,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: match self {
                Self::Domain { details, .. } => details.clone(),
                _ => None,
            },
        }
    }
}

impl From<EngineError> for RpcError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Storage(inner) => RpcError::Internal {
                message: inner.to_string(),
            },
            EngineError::VersionConflict { ref current } => {
                let details = serde_json::to_value(current.as_ref()).ok().map(|entry| {
                    serde_json::json!({ "currentEntry": entry })
                });
                RpcError::Domain {
                    code: CONFLICT,
                    message: err.to_string(),
                    details,
                }
            }
            other => RpcError::Domain {
                code: engine_code(&other),
                message: other.to_string(),
                details: None,
            },
        }
    }
}

fn engine_code(err: &EngineError) -> &'static str {
    match err {
        EngineError::AuthenticationRequired => AUTHENTICATION_REQUIRED,
        EngineError::Forbidden(_) => FORBIDDEN,
        EngineError::NotFound { .. } => NOT_FOUND,
        EngineError::Validation(_) => VALIDATION_ERROR,
        EngineError::Conflict(_) | EngineError::VersionConflict { .. } => CONFLICT,
        EngineError::AnalysisNotEditable { .. } => ANALYSIS_NOT_EDITABLE,
        EngineError::InvalidTransition { .. } => INVALID_TRANSITION,
        EngineError::Storage(_) => INTERNAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_params_code() {
        let err = RpcError::InvalidParams {
            message: "bad".into(),
        };
        assert_eq!(err.code(), INVALID_PARAMS);
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn engine_forbidden_maps() {
        let err: RpcError = EngineError::Forbidden("no access".into()).into();
        assert_eq!(err.code(), FORBIDDEN);
    }

    #[test]
    fn engine_conflict_maps() {
        let err: RpcError = EngineError::Conflict("session csn_1 is ended".into()).into();
        assert_eq!(err.code(), CONFLICT);
        assert!(err.to_string().contains("ended"));
    }

    #[test]
    fn version_conflict_carries_current_entry() {
        let current = hazsync_store::EntryRow {
            id: "ent_1".into(),
            analysis_id: "anl_1".into(),
            node_id: "nod_1".into(),
            guide_word: "no".into(),
            parameter: "flow".into(),
            deviation: "no flow".into(),
            causes: vec![],
            consequences: vec![],
            safeguards: vec![],
            recommendations: vec![],
            notes: None,
            version: 4,
            severity: None,
            likelihood: None,
            risk_rank: None,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            updated_by: "usr_1".into(),
        };
        let err: RpcError = EngineError::VersionConflict {
            current: Box::new(current),
        }
        .into();
        assert_eq!(err.code(), CONFLICT);
        let body = err.to_error_body();
        let details = body.details.unwrap();
        assert_eq!(details["currentEntry"]["version"], 4);
        assert_eq!(details["currentEntry"]["id"], "ent_1");
    }

    #[test]
    fn storage_maps_to_internal() {
        let err: RpcError =
            EngineError::Storage(hazsync_store::StoreError::Internal("io".into())).into();
        assert_eq!(err.code(), INTERNAL_ERROR);
    }
}
