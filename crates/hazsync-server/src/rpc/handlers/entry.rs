//! Entry mutation handlers: create, update, delete, risk assessment, list.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::instrument;

use hazsync_engine::coordinator::CreateEntryParams;
use hazsync_store::EntryPatch;

use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::handlers::{
    optional_string_list, optional_string_param, require_i64_param, require_string_param,
    require_u8_param,
};
use crate::rpc::registry::MethodHandler;

/// Create a new analysis entry.
pub struct CreateEntryHandler;

#[async_trait]
impl MethodHandler for CreateEntryHandler {
    #[instrument(skip(self, ctx, params), fields(method = "entry.create"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;

        let create = CreateEntryParams {
            analysis_id: require_string_param(params.as_ref(), "analysisId")?,
            node_id: require_string_param(params.as_ref(), "nodeId")?,
            guide_word: require_string_param(params.as_ref(), "guideWord")?,
            parameter: require_string_param(params.as_ref(), "parameter")?,
            deviation: require_string_param(params.as_ref(), "deviation")?,
            causes: optional_string_list(params.as_ref(), "causes")?.unwrap_or_default(),
            consequences: optional_string_list(params.as_ref(), "consequences")?
                .unwrap_or_default(),
            safeguards: optional_string_list(params.as_ref(), "safeguards")?.unwrap_or_default(),
            recommendations: optional_string_list(params.as_ref(), "recommendations")?
                .unwrap_or_default(),
            notes: optional_string_param(params.as_ref(), "notes"),
        };

        let (entry, aggregate) = ctx
            .coordinator
            .create_entry(&session_id, &caller, &create)?;
        Ok(json!({ "entry": entry, "aggregate": aggregate }))
    }
}

/// Version-checked entry update.
pub struct UpdateEntryHandler;

#[async_trait]
impl MethodHandler for UpdateEntryHandler {
    #[instrument(skip(self, ctx, params), fields(method = "entry.update"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let entry_id = require_string_param(params.as_ref(), "entryId")?;
        let base_version = require_i64_param(params.as_ref(), "baseVersion")?;

        let patch = EntryPatch {
            guide_word: optional_string_param(params.as_ref(), "guideWord"),
            parameter: optional_string_param(params.as_ref(), "parameter"),
            deviation: optional_string_param(params.as_ref(), "deviation"),
            causes: optional_string_list(params.as_ref(), "causes")?,
            consequences: optional_string_list(params.as_ref(), "consequences")?,
            safeguards: optional_string_list(params.as_ref(), "safeguards")?,
            recommendations: optional_string_list(params.as_ref(), "recommendations")?,
            notes: optional_string_param(params.as_ref(), "notes"),
        };

        let entry =
            ctx.coordinator
                .update_entry(&session_id, &caller, &entry_id, base_version, &patch)?;
        Ok(json!({ "entry": entry }))
    }
}

/// Delete an entry.
pub struct DeleteEntryHandler;

#[async_trait]
impl MethodHandler for DeleteEntryHandler {
    #[instrument(skip(self, ctx), fields(method = "entry.delete"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let entry_id = require_string_param(params.as_ref(), "entryId")?;

        let (deleted, aggregate) = ctx
            .coordinator
            .delete_entry(&session_id, &caller, &entry_id)?;
        Ok(json!({
            "entryId": deleted.id,
            "deleted": true,
            "aggregate": aggregate,
        }))
    }
}

/// Assess an entry's risk factors.
pub struct UpdateEntryRiskHandler;

#[async_trait]
impl MethodHandler for UpdateEntryRiskHandler {
    #[instrument(skip(self, ctx), fields(method = "entry.updateRisk"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let entry_id = require_string_param(params.as_ref(), "entryId")?;
        let severity = require_u8_param(params.as_ref(), "severity")?;
        let likelihood = require_u8_param(params.as_ref(), "likelihood")?;

        let (entry, aggregate) = ctx.coordinator.update_entry_risk(
            &session_id,
            &caller,
            &entry_id,
            severity,
            likelihood,
        )?;
        Ok(json!({ "entry": entry, "aggregate": aggregate }))
    }
}

/// Clear an entry's risk assessment.
pub struct ClearEntryRiskHandler;

#[async_trait]
impl MethodHandler for ClearEntryRiskHandler {
    #[instrument(skip(self, ctx), fields(method = "entry.clearRisk"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let entry_id = require_string_param(params.as_ref(), "entryId")?;

        let (entry, aggregate) =
            ctx.coordinator
                .clear_entry_risk(&session_id, &caller, &entry_id)?;
        Ok(json!({ "entry": entry, "aggregate": aggregate }))
    }
}

/// List an analysis's entries (state re-fetch after reconnect).
pub struct ListEntriesHandler;

#[async_trait]
impl MethodHandler for ListEntriesHandler {
    #[instrument(skip(self, ctx), fields(method = "entry.list"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let analysis_id = require_string_param(params.as_ref(), "analysisId")?;
        let entries = ctx.coordinator.list_entries(&analysis_id)?;
        Ok(json!({ "entries": entries }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::errors;
    use crate::rpc::handlers::session::{JoinSessionHandler, OpenSessionHandler};
    use crate::rpc::handlers::test_helpers::make_test_context;

    async fn joined_session(ctx: &RpcContext) -> String {
        let result = OpenSessionHandler
            .handle(Some(json!({"analysisId": "anl_1"})), ctx)
            .await
            .unwrap();
        let session_id = result["session"]["id"].as_str().unwrap().to_owned();
        let _ = JoinSessionHandler
            .handle(Some(json!({"sessionId": session_id})), ctx)
            .await
            .unwrap();
        session_id
    }

    fn create_params(session_id: &str) -> Value {
        json!({
            "sessionId": session_id,
            "analysisId": "anl_1",
            "nodeId": "nod_1",
            "guideWord": "more",
            "parameter": "pressure",
            "deviation": "more pressure in separator",
            "causes": ["control valve fails closed"],
            "consequences": ["PSV lifts"],
        })
    }

    #[tokio::test]
    async fn create_returns_entry_and_aggregate() {
        let (ctx, _f) = make_test_context();
        let session_id = joined_session(&ctx).await;

        let result = CreateEntryHandler
            .handle(Some(create_params(&session_id)), &ctx)
            .await
            .unwrap();
        assert_eq!(result["entry"]["version"], 1);
        assert_eq!(result["entry"]["guideWord"], "more");
        assert_eq!(result["aggregate"]["totalEntries"], 1);
        assert_eq!(result["aggregate"]["unassessedCount"], 1);
    }

    #[tokio::test]
    async fn create_missing_field_is_invalid_params() {
        let (ctx, _f) = make_test_context();
        let session_id = joined_session(&ctx).await;

        let err = CreateEntryHandler
            .handle(Some(json!({"sessionId": session_id})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn create_on_approved_analysis_is_gated() {
        let (ctx, f) = make_test_context();
        let session_id = joined_session(&ctx).await;
        f.store.set_analysis_status("anl_1", "approved").unwrap();

        let err = CreateEntryHandler
            .handle(Some(create_params(&session_id)), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::ANALYSIS_NOT_EDITABLE);
    }

    #[tokio::test]
    async fn update_conflict_returns_current_entry_details() {
        let (ctx, _f) = make_test_context();
        let session_id = joined_session(&ctx).await;
        let created = CreateEntryHandler
            .handle(Some(create_params(&session_id)), &ctx)
            .await
            .unwrap();
        let entry_id = created["entry"]["id"].as_str().unwrap().to_owned();

        // First update wins.
        let updated = UpdateEntryHandler
            .handle(
                Some(json!({
                    "sessionId": session_id,
                    "entryId": entry_id,
                    "baseVersion": 1,
                    "notes": "first wins",
                })),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(updated["entry"]["version"], 2);

        // Stale second update loses and sees the winner's state.
        let err = UpdateEntryHandler
            .handle(
                Some(json!({
                    "sessionId": session_id,
                    "entryId": entry_id,
                    "baseVersion": 1,
                    "notes": "stale",
                })),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::CONFLICT);
        let details = err.to_error_body().details.unwrap();
        assert_eq!(details["currentEntry"]["version"], 2);
        assert_eq!(details["currentEntry"]["notes"], "first wins");
    }

    #[tokio::test]
    async fn risk_update_then_stale_content_edit() {
        let (ctx, _f) = make_test_context();
        let session_id = joined_session(&ctx).await;
        let created = CreateEntryHandler
            .handle(Some(create_params(&session_id)), &ctx)
            .await
            .unwrap();
        let entry_id = created["entry"]["id"].as_str().unwrap().to_owned();

        let assessed = UpdateEntryRiskHandler
            .handle(
                Some(json!({
                    "sessionId": session_id,
                    "entryId": entry_id,
                    "severity": 4,
                    "likelihood": 3,
                })),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(assessed["entry"]["version"], 2);
        assert_eq!(assessed["entry"]["riskRank"], "medium");
        assert_eq!(assessed["aggregate"]["mediumRiskCount"], 1);

        let err = UpdateEntryHandler
            .handle(
                Some(json!({
                    "sessionId": session_id,
                    "entryId": entry_id,
                    "baseVersion": 1,
                    "notes": "x",
                })),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::CONFLICT);
    }

    #[tokio::test]
    async fn risk_factors_validated() {
        let (ctx, _f) = make_test_context();
        let session_id = joined_session(&ctx).await;
        let created = CreateEntryHandler
            .handle(Some(create_params(&session_id)), &ctx)
            .await
            .unwrap();
        let entry_id = created["entry"]["id"].as_str().unwrap().to_owned();

        let err = UpdateEntryRiskHandler
            .handle(
                Some(json!({
                    "sessionId": session_id,
                    "entryId": entry_id,
                    "severity": 0,
                    "likelihood": 3,
                })),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn clear_risk_restores_unassessed() {
        let (ctx, _f) = make_test_context();
        let session_id = joined_session(&ctx).await;
        let created = CreateEntryHandler
            .handle(Some(create_params(&session_id)), &ctx)
            .await
            .unwrap();
        let entry_id = created["entry"]["id"].as_str().unwrap().to_owned();

        let _ = UpdateEntryRiskHandler
            .handle(
                Some(json!({
                    "sessionId": session_id,
                    "entryId": entry_id,
                    "severity": 5,
                    "likelihood": 5,
                })),
                &ctx,
            )
            .await
            .unwrap();
        let cleared = ClearEntryRiskHandler
            .handle(
                Some(json!({"sessionId": session_id, "entryId": entry_id})),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(cleared["entry"]["version"], 3);
        assert!(cleared["entry"]["riskRank"].is_null());
        assert_eq!(cleared["aggregate"]["unassessedCount"], 1);
    }

    #[tokio::test]
    async fn delete_and_list() {
        let (ctx, _f) = make_test_context();
        let session_id = joined_session(&ctx).await;
        let created = CreateEntryHandler
            .handle(Some(create_params(&session_id)), &ctx)
            .await
            .unwrap();
        let entry_id = created["entry"]["id"].as_str().unwrap().to_owned();

        let listed = ListEntriesHandler
            .handle(Some(json!({"analysisId": "anl_1"})), &ctx)
            .await
            .unwrap();
        assert_eq!(listed["entries"].as_array().unwrap().len(), 1);

        let deleted = DeleteEntryHandler
            .handle(
                Some(json!({"sessionId": session_id, "entryId": entry_id})),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(deleted["deleted"], true);
        assert_eq!(deleted["aggregate"]["totalEntries"], 0);

        let listed = ListEntriesHandler
            .handle(Some(json!({"analysisId": "anl_1"})), &ctx)
            .await
            .unwrap();
        assert!(listed["entries"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mutations_require_caller() {
        let (ctx, _f) = make_test_context();
        let session_id = joined_session(&ctx).await;
        let anonymous = RpcContext {
            caller: None,
            ..ctx
        };
        let err = CreateEntryHandler
            .handle(Some(create_params(&session_id)), &anonymous)
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::AUTHENTICATION_REQUIRED);
    }
}
