//! Analysis-level handlers: the risk aggregate view and its live
//! subscription.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::instrument;

use crate::rpc::context::RpcContext;
use crate::rpc::errors::{self, RpcError};
use crate::rpc::handlers::require_string_param;
use crate::rpc::registry::MethodHandler;

fn gate_analysis_access(ctx: &RpcContext, analysis_id: &str) -> Result<(), RpcError> {
    let caller = ctx.require_caller()?.to_owned();
    let analysis = ctx
        .store
        .find_analysis(analysis_id)
        .map_err(|e| RpcError::Internal {
            message: e.to_string(),
        })?
        .ok_or_else(|| RpcError::Domain {
            code: errors::NOT_FOUND,
            message: format!("analysis not found: {analysis_id}"),
            details: None,
        })?;
    let role = ctx
        .store
        .member_role(&analysis.project_id, &caller)
        .map_err(|e| RpcError::Internal {
            message: e.to_string(),
        })?;
    if role.is_none() {
        return Err(RpcError::Domain {
            code: errors::FORBIDDEN,
            message: format!(
                "user {caller} has no access to project {}",
                analysis.project_id
            ),
            details: None,
        });
    }
    Ok(())
}

/// Recompute and return the risk aggregate for an analysis.
pub struct RiskAggregateHandler;

#[async_trait]
impl MethodHandler for RiskAggregateHandler {
    #[instrument(skip(self, ctx), fields(method = "analysis.riskAggregate"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let analysis_id = require_string_param(params.as_ref(), "analysisId")?;
        gate_analysis_access(ctx, &analysis_id)?;

        let aggregate = ctx.aggregator.recompute(&analysis_id)?;
        Ok(json!({ "aggregate": aggregate }))
    }
}

/// Subscribe this connection to risk-affecting events for an analysis.
/// The WebSocket session loop applies the subscription on success.
pub struct SubscribeAggregateHandler;

#[async_trait]
impl MethodHandler for SubscribeAggregateHandler {
    #[instrument(skip(self, ctx), fields(method = "analysis.subscribe"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let analysis_id = require_string_param(params.as_ref(), "analysisId")?;
        gate_analysis_access(ctx, &analysis_id)?;
        Ok(json!({ "analysisId": analysis_id, "subscribed": true }))
    }
}

/// Drop this connection's aggregate subscription for an analysis.
pub struct UnsubscribeAggregateHandler;

#[async_trait]
impl MethodHandler for UnsubscribeAggregateHandler {
    #[instrument(skip(self, _ctx), fields(method = "analysis.unsubscribe"))]
    async fn handle(&self, params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        let analysis_id = require_string_param(params.as_ref(), "analysisId")?;
        Ok(json!({ "analysisId": analysis_id, "subscribed": false }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
