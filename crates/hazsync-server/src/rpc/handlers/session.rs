//! Session handlers: open (get-or-create), join, leave, heartbeat, get,
//! transition.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::instrument;

use hazsync_core::status::SessionStatus;

use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::handlers::{optional_string_param, require_string_param};
use crate::rpc::registry::MethodHandler;

/// Get or lazily create the active session for an analysis.
pub struct OpenSessionHandler;

#[async_trait]
impl MethodHandler for OpenSessionHandler {
    #[instrument(skip(self, ctx), fields(method = "session.open"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let analysis_id = require_string_param(params.as_ref(), "analysisId")?;
        let name = optional_string_param(params.as_ref(), "name");

        let (session, created) =
            ctx.sessions
                .get_or_create_active(&analysis_id, &caller, name.as_deref())?;
        Ok(json!({ "session": session, "created": created }))
    }
}

/// Join a session; returns session, participant, and roster in one trip.
pub struct JoinSessionHandler;

#[async_trait]
impl MethodHandler for JoinSessionHandler {
    #[instrument(skip(self, ctx), fields(method = "session.join"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;

        let result = ctx.presence.join(&session_id, &caller)?;
        Ok(json!({
            "session": result.session,
            "participant": result.participant,
            "roster": result.roster,
        }))
    }
}

/// Leave a session (idempotent).
pub struct LeaveSessionHandler;

#[async_trait]
impl MethodHandler for LeaveSessionHandler {
    #[instrument(skip(self, ctx), fields(method = "session.leave"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;

        ctx.presence.leave(&session_id, &caller)?;
        Ok(json!({ "sessionId": session_id, "left": true }))
    }
}

/// Refresh presence activity and optionally the cursor payload.
pub struct HeartbeatHandler;

#[async_trait]
impl MethodHandler for HeartbeatHandler {
    #[instrument(skip(self, ctx, params), fields(method = "session.heartbeat"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        // Opaque payload: stored and echoed verbatim, never validated.
        let cursor = params
            .as_ref()
            .and_then(|p| p.get("cursorPosition"))
            .cloned();

        let refreshed = ctx
            .presence
            .heartbeat(&session_id, &caller, cursor.as_ref())?;
        Ok(json!({ "sessionId": session_id, "refreshed": refreshed }))
    }
}

/// Fetch a session with its active roster.
pub struct GetSessionHandler;

#[async_trait]
impl MethodHandler for GetSessionHandler {
    #[instrument(skip(self, ctx), fields(method = "session.get"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let session_id = require_string_param(params.as_ref(), "sessionId")?;

        let session = ctx.sessions.find_session(&session_id)?;
        let roster = ctx.presence.active_participants(&session_id)?;
        Ok(json!({ "session": session, "roster": roster }))
    }
}

/// Transition a session's lifecycle status.
pub struct TransitionSessionHandler;

#[async_trait]
impl MethodHandler for TransitionSessionHandler {
    #[instrument(skip(self, ctx), fields(method = "session.transition"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let caller = ctx.require_caller()?.to_owned();
        let session_id = require_string_param(params.as_ref(), "sessionId")?;
        let status_str = require_string_param(params.as_ref(), "status")?;
        let target: SessionStatus =
            status_str.parse().map_err(|_| RpcError::InvalidParams {
                message: format!("Unknown status '{status_str}'"),
            })?;

        let session = ctx.sessions.transition(&session_id, &caller, target)?;
        Ok(json!({ "session": session }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::errors;
    use crate::rpc::handlers::test_helpers::make_test_context;

    async fn open_session(ctx: &RpcContext) -> String {
        let result = OpenSessionHandler
            .handle(Some(json!({"analysisId": "anl_1"})), ctx)
            .await
            .unwrap();
        result["session"]["id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn open_creates_then_reuses() {
        let (ctx, _f) = make_test_context();
        let first = OpenSessionHandler
            .handle(Some(json!({"analysisId": "anl_1"})), &ctx)
            .await
            .unwrap();
        assert_eq!(first["created"], true);

        let second = OpenSessionHandler
            .handle(Some(json!({"analysisId": "anl_1"})), &ctx)
            .await
            .unwrap();
        assert_eq!(second["created"], false);
        assert_eq!(second["session"]["id"], first["session"]["id"]);
    }

    #[tokio::test]
    async fn open_requires_caller() {
        let (ctx, _f) = make_test_context();
        let anonymous = RpcContext {
            caller: None,
            ..ctx
        };
        let err = OpenSessionHandler
            .handle(Some(json!({"analysisId": "anl_1"})), &anonymous)
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::AUTHENTICATION_REQUIRED);
    }

    #[tokio::test]
    async fn join_returns_roster() {
        let (ctx, _f) = make_test_context();
        let session_id = open_session(&ctx).await;

        let result = JoinSessionHandler
            .handle(Some(json!({"sessionId": session_id})), &ctx)
            .await
            .unwrap();
        assert_eq!(result["participant"]["userId"], "usr_a");
        assert_eq!(result["participant"]["userName"], "Ada");
        assert_eq!(result["roster"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn join_missing_session_is_not_found() {
        let (ctx, _f) = make_test_context();
        let err = JoinSessionHandler
            .handle(Some(json!({"sessionId": "csn_missing"})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::NOT_FOUND);
    }

    #[tokio::test]
    async fn join_ended_session_is_conflict() {
        let (ctx, _f) = make_test_context();
        let session_id = open_session(&ctx).await;
        let _ = TransitionSessionHandler
            .handle(
                Some(json!({"sessionId": session_id, "status": "ended"})),
                &ctx,
            )
            .await
            .unwrap();

        let err = JoinSessionHandler
            .handle(Some(json!({"sessionId": session_id})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::CONFLICT);
        assert!(err.to_string().contains("ended"));
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let (ctx, _f) = make_test_context();
        let session_id = open_session(&ctx).await;
        let _ = JoinSessionHandler
            .handle(Some(json!({"sessionId": session_id})), &ctx)
            .await
            .unwrap();

        for _ in 0..2 {
            let result = LeaveSessionHandler
                .handle(Some(json!({"sessionId": session_id})), &ctx)
                .await
                .unwrap();
            assert_eq!(result["left"], true);
        }
    }

    #[tokio::test]
    async fn heartbeat_round_trips_cursor() {
        let (ctx, f) = make_test_context();
        let session_id = open_session(&ctx).await;
        let _ = JoinSessionHandler
            .handle(Some(json!({"sessionId": session_id})), &ctx)
            .await
            .unwrap();

        let result = HeartbeatHandler
            .handle(
                Some(json!({
                    "sessionId": session_id,
                    "cursorPosition": {"nodeId": "nod_1", "row": 3},
                })),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result["refreshed"], true);

        let row = f
            .store
            .find_participant(&session_id, "usr_a")
            .unwrap()
            .unwrap();
        assert_eq!(row.cursor_position.unwrap()["row"], 3);
    }

    #[tokio::test]
    async fn get_returns_session_and_roster() {
        let (ctx, _f) = make_test_context();
        let session_id = open_session(&ctx).await;
        let _ = JoinSessionHandler
            .handle(Some(json!({"sessionId": session_id})), &ctx)
            .await
            .unwrap();

        let result = GetSessionHandler
            .handle(Some(json!({"sessionId": session_id})), &ctx)
            .await
            .unwrap();
        assert_eq!(result["session"]["status"], "active");
        assert_eq!(result["roster"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transition_rejects_unknown_status() {
        let (ctx, _f) = make_test_context();
        let session_id = open_session(&ctx).await;
        let err = TransitionSessionHandler
            .handle(
                Some(json!({"sessionId": session_id, "status": "archived"})),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn transition_rejects_illegal_move() {
        let (ctx, _f) = make_test_context();
        let session_id = open_session(&ctx).await;
        let _ = TransitionSessionHandler
            .handle(
                Some(json!({"sessionId": session_id, "status": "ended"})),
                &ctx,
            )
            .await
            .unwrap();

        let err = TransitionSessionHandler
            .handle(
                Some(json!({"sessionId": session_id, "status": "active"})),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), errors::INVALID_TRANSITION);
    }
}
