//! Per-connection RPC context.
//!
//! The engine components are shared (`Arc`); the caller identity is bound
//! per connection at upgrade time. Handlers that mutate state call
//! [`RpcContext::require_caller`], which turns an anonymous connection
//! into an `AUTHENTICATION_REQUIRED` error.

use std::sync::Arc;
use std::time::Instant;

use hazsync_engine::aggregate::RiskAggregator;
use hazsync_engine::coordinator::EntryCoordinator;
use hazsync_engine::presence::PresenceTracker;
use hazsync_engine::registry::SessionRegistry;
use hazsync_store::CollabStore;

use crate::rpc::errors::{AUTHENTICATION_REQUIRED, RpcError};
use crate::websocket::registry::ConnectionRegistry;

/// Shared state visible to every RPC handler.
#[derive(Clone)]
pub struct RpcContext {
    /// Session lifecycle component.
    pub sessions: Arc<SessionRegistry>,
    /// Presence component.
    pub presence: Arc<PresenceTracker>,
    /// Entry mutation component.
    pub coordinator: Arc<EntryCoordinator>,
    /// Risk aggregate component.
    pub aggregator: Arc<RiskAggregator>,
    /// Storage (read-side helpers for handlers).
    pub store: Arc<CollabStore>,
    /// Live connection registry.
    pub connections: Arc<ConnectionRegistry>,
    /// Authenticated user for this connection, if any.
    pub caller: Option<String>,
    /// When the server started.
    pub server_start_time: Instant,
}

impl RpcContext {
    /// The authenticated caller, or `AUTHENTICATION_REQUIRED`.
    pub fn require_caller(&self) -> Result<&str, RpcError> {
        self.caller.as_deref().ok_or(RpcError::Domain {
            code: AUTHENTICATION_REQUIRED,
            message: "authentication required".into(),
            details: None,
        })
    }

    /// Clone this context with a caller bound (used at connection setup).
    pub fn with_caller(&self, user_id: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.caller = Some(user_id.into());
        ctx
    }
}
