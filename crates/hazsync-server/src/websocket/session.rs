//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;
use crate::websocket::connection::ClientConnection;
use crate::websocket::handler::{HandleResult, handle_message};
use crate::websocket::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::websocket::registry::ConnectionRegistry;

/// Outbound channel depth per connection. Events past this buffer drop.
const SEND_BUFFER: usize = 1024;

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection and sends `connection.established`
/// 2. Dispatches incoming text frames as RPC requests
/// 3. Applies connection side effects (session binding, subscriptions)
/// 4. Forwards outbound events/responses via the send channel
/// 5. Pings periodically and disconnects unresponsive clients
/// 6. Cleans up on disconnect
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: String,
    user_id: Option<String>,
    registry: Arc<MethodRegistry>,
    base_ctx: RpcContext,
    connections: Arc<ConnectionRegistry>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(SEND_BUFFER);
    let connection = Arc::new(ClientConnection::new(
        client_id.clone(),
        user_id.clone(),
        send_tx,
    ));

    let ctx = match user_id {
        Some(ref user) => base_ctx.with_caller(user.clone()),
        None => base_ctx,
    };

    info!(user_id = ?user_id, "client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    connections.register(Arc::clone(&connection)).await;

    let established = serde_json::json!({
        "type": "connection.established",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": { "clientId": client_id },
    });
    if let Ok(json) = serde_json::to_string(&established) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with periodic Ping frames.
    let session_cancel = cancel.child_token();
    let outbound_cancel = session_cancel.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        // Skip the immediate first tick.
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx
                                .send(Message::Text(text.as_str().into()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Liveness watcher.
    let mut heartbeat = tokio::spawn(run_heartbeat(
        Arc::clone(&connection),
        heartbeat_interval,
        heartbeat_timeout,
        session_cancel.clone(),
    ));

    // Inbound loop.
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        connection.mark_alive();
                        let result = handle_message(text.as_str(), &registry, &ctx).await;
                        apply_connection_effects(&connection, &result);
                        if !connection.send(Arc::new(result.response_json)) {
                            warn!(method = %result.method, "response dropped (send buffer full)");
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        connection.mark_alive();
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Axum replies automatically; treat as activity.
                        connection.mark_alive();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("client closed connection");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("binary frames unsupported, ignoring");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            hb = &mut heartbeat => {
                if matches!(hb, Ok(HeartbeatResult::TimedOut)) {
                    warn!("heartbeat timed out, disconnecting client");
                }
                break;
            }
            () = cancel.cancelled() => {
                debug!("server shutting down, closing connection");
                break;
            }
        }
    }

    // Cleanup.
    session_cancel.cancel();
    connections.unregister(&connection.id).await;
    gauge!("ws_connections_active").decrement(1.0);
    drop(connection);
    let _ = outbound.await;
    info!("client disconnected");
}

/// Apply connection-level side effects of a successful RPC.
///
/// The handlers themselves never see the connection; binding is derived
/// here from the method name and the structured response.
fn apply_connection_effects(connection: &ClientConnection, result: &HandleResult) {
    if !result.response.success {
        return;
    }
    let Some(ref value) = result.response.result else {
        return;
    };
    match result.method.as_str() {
        "session.join" => {
            if let Some(session_id) = value["session"]["id"].as_str() {
                connection.bind_session(session_id);
            }
        }
        "session.leave" => connection.unbind_session(),
        "analysis.subscribe" => {
            if let Some(analysis_id) = value["analysisId"].as_str() {
                connection.watch_analysis(analysis_id);
            }
        }
        "analysis.unsubscribe" => {
            if let Some(analysis_id) = value["analysisId"].as_str() {
                connection.unwatch_analysis(analysis_id);
            }
        }
        _ => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
