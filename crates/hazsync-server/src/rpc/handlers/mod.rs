//! RPC method handlers, grouped by method prefix.
//!
//! | Prefix | Module |
//! |--------|--------|
//! | `session.*` | [`session`] |
//! | `entry.*` | [`entry`] |
//! | `analysis.*` | [`analysis`] |
//! | `system.*` | [`system`] |

pub mod analysis;
pub mod entry;
pub mod session;
pub mod system;

use serde_json::Value;

use crate::rpc::errors::RpcError;
use crate::rpc::registry::MethodRegistry;

/// Build the full method registry.
pub fn build_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();

    registry.register("session.open", session::OpenSessionHandler);
    registry.register("session.join", session::JoinSessionHandler);
    registry.register("session.leave", session::LeaveSessionHandler);
    registry.register("session.heartbeat", session::HeartbeatHandler);
    registry.register("session.get", session::GetSessionHandler);
    registry.register("session.transition", session::TransitionSessionHandler);

    registry.register("entry.create", entry::CreateEntryHandler);
    registry.register("entry.update", entry::UpdateEntryHandler);
    registry.register("entry.delete", entry::DeleteEntryHandler);
    registry.register("entry.updateRisk", entry::UpdateEntryRiskHandler);
    registry.register("entry.clearRisk", entry::ClearEntryRiskHandler);
    registry.register("entry.list", entry::ListEntriesHandler);

    registry.register("analysis.riskAggregate", analysis::RiskAggregateHandler);
    registry.register("analysis.subscribe", analysis::SubscribeAggregateHandler);
    registry.register("analysis.unsubscribe", analysis::UnsubscribeAggregateHandler);

    registry.register("system.ping", system::PingHandler);

    registry
}

// ── Param helpers ───────────────────────────────────────────────────

/// Extract a required string parameter.
pub(crate) fn require_string_param(params: Option<&Value>, key: &str) -> Result<String, RpcError> {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Missing required parameter '{key}'"),
        })
}

/// Extract an optional string parameter.
pub(crate) fn optional_string_param(params: Option<&Value>, key: &str) -> Option<String> {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .map(String::from)
}

/// Extract a required integer parameter.
pub(crate) fn require_i64_param(params: Option<&Value>, key: &str) -> Result<i64, RpcError> {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Missing required integer parameter '{key}'"),
        })
}

/// Extract a required small (u8) integer parameter.
pub(crate) fn require_u8_param(params: Option<&Value>, key: &str) -> Result<u8, RpcError> {
    let value = require_i64_param(params, key)?;
    u8::try_from(value).map_err(|_| RpcError::InvalidParams {
        message: format!("Parameter '{key}' out of range: {value}"),
    })
}

/// Extract an optional list-of-strings parameter. A present-but-malformed
/// list is an error rather than silently dropped items.
pub(crate) fn optional_string_list(
    params: Option<&Value>,
    key: &str,
) -> Result<Option<Vec<String>>, RpcError> {
    let Some(value) = params.and_then(|p| p.get(key)) else {
        return Ok(None);
    };
    let items = value.as_array().ok_or_else(|| RpcError::InvalidParams {
        message: format!("Parameter '{key}' must be an array of strings"),
    })?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = item.as_str().ok_or_else(|| RpcError::InvalidParams {
            message: format!("Parameter '{key}' must contain only strings"),
        })?;
        out.push(text.to_owned());
    }
    Ok(Some(out))
}

// ── Test support ────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::Arc;
    use std::time::Instant;

    use hazsync_engine::CollabEngine;
    use hazsync_engine::collaborators::Collaborators;
    use hazsync_settings::EmptySessionPolicy;
    use hazsync_store::{AnalysisRow, CollabStore, NodeRow, UserRow};

    use crate::rpc::context::RpcContext;
    use crate::websocket::registry::ConnectionRegistry;

    /// Shared handles the handler tests poke at directly.
    pub struct TestFixture {
        /// The backing store (seeded with `anl_1`, `nod_1`/`nod_2`,
        /// `usr_a`/`usr_b` on project `prj_1`).
        pub store: Arc<CollabStore>,
    }

    /// Build a context authenticated as `usr_a` over a seeded store.
    pub fn make_test_context() -> (RpcContext, TestFixture) {
        let store = Arc::new(CollabStore::in_memory().unwrap());
        store
            .upsert_analysis(&AnalysisRow {
                id: "anl_1".into(),
                project_id: "prj_1".into(),
                document_id: "doc_1".into(),
                status: "draft".into(),
            })
            .unwrap();
        for node in ["nod_1", "nod_2"] {
            store
                .upsert_node(&NodeRow {
                    id: node.into(),
                    document_id: "doc_1".into(),
                    name: format!("Node {node}"),
                })
                .unwrap();
        }
        for (id, name) in [("usr_a", "Ada"), ("usr_b", "Brin")] {
            store
                .upsert_user(&UserRow {
                    id: id.into(),
                    display_name: name.into(),
                    email: format!("{id}@example.com"),
                })
                .unwrap();
            store.add_project_member("prj_1", id, "analyst").unwrap();
        }

        let engine = CollabEngine::new(
            Arc::clone(&store),
            Collaborators::store_backed(Arc::clone(&store)),
            EmptySessionPolicy::Keep,
        );

        let ctx = RpcContext {
            sessions: Arc::clone(&engine.registry),
            presence: Arc::clone(&engine.presence),
            coordinator: Arc::clone(&engine.coordinator),
            aggregator: Arc::clone(&engine.aggregator),
            store: Arc::clone(&store),
            connections: Arc::new(ConnectionRegistry::new()),
            caller: Some("usr_a".into()),
            server_start_time: Instant::now(),
        };
        (ctx, TestFixture { store })
    }
}
