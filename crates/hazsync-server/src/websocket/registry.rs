//! Event fan-out to connected WebSocket clients.
//!
//! The registry is explicitly injected wherever fan-out is needed — there
//! is no process-wide singleton, so multiple server instances (or tests)
//! each own their connection state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use hazsync_core::events::SessionEvent;

use super::connection::ClientConnection;

/// Maximum total lifetime message drops before forcibly disconnecting a
/// slow client.
const MAX_TOTAL_DROPS: u64 = 100;

/// Manages event delivery to connected clients.
pub struct ConnectionRegistry {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    /// Atomic counter tracking total connections (avoids read-locking for
    /// count queries).
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Register a connection.
    pub async fn register(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Unregister a connection by ID.
    pub async fn unregister(&self, connection_id: &str) {
        let mut conns = self.connections.write().await;
        if conns.remove(connection_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Deliver an event to every connection bound to its session and, for
    /// risk-affecting kinds, to connections watching the analysis's
    /// aggregate view (without double-sending to session members).
    pub async fn deliver(&self, event: &SessionEvent) {
        let session_id = event.session_id.clone();
        let analysis_id = event.analysis_id.clone();
        let include_watchers = event.kind.is_risk_affecting();
        self.broadcast_filtered(event, move |conn| {
            let in_session = conn.session_id().as_deref() == Some(session_id.as_str());
            in_session || (include_watchers && conn.watches_analysis(&analysis_id))
        })
        .await;
    }

    /// Broadcast an event to every connection bound to the given session.
    pub async fn broadcast_to_session(&self, session_id: &str, event: &SessionEvent) {
        let session_id = session_id.to_owned();
        self.broadcast_filtered(event, move |conn| {
            conn.session_id().as_deref() == Some(session_id.as_str())
        })
        .await;
    }

    /// Serialize the event once, fan out to matching clients, remove
    /// clients past the lifetime drop threshold.
    ///
    /// Delivery is best-effort at-most-once `try_send`: a full or closed
    /// client channel drops the event for that client only, and never
    /// blocks the caller or other clients.
    async fn broadcast_filtered(
        &self,
        event: &SessionEvent,
        filter: impl Fn(&ClientConnection) -> bool,
    ) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(kind = event.kind.as_str(), error = %e, "failed to serialize event");
                return;
            }
        };
        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read().await;
            let mut recipients = 0u32;
            for conn in conns.values() {
                if filter(conn) {
                    recipients += 1;
                    if !conn.send(Arc::clone(&json)) {
                        counter!("ws_broadcast_drops_total").increment(1);
                        let drops = conn.drop_count();
                        if drops >= MAX_TOTAL_DROPS {
                            warn!(conn_id = %conn.id, drops, "disconnecting slow client");
                            to_remove.push(conn.id.clone());
                        } else {
                            warn!(conn_id = %conn.id, total_drops = drops, "failed to send event to client (channel full)");
                        }
                    }
                }
            }
            debug!(
                kind = event.kind.as_str(),
                session_id = %event.session_id,
                sequence = event.sequence,
                recipients,
                "event delivered"
            );
        }
        if !to_remove.is_empty() {
            let mut conns = self.connections.write().await;
            for id in &to_remove {
                if conns.remove(id).is_some() {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Get connections bound to a specific session.
    pub async fn session_connections(&self, session_id: &str) -> Vec<Arc<ClientConnection>> {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|c| c.session_id().as_deref() == Some(session_id))
            .cloned()
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hazsync_core::events::EventKind;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn make_connection_with_rx(
        id: &str,
        session: Option<&str>,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(id.into(), None, tx);
        if let Some(sid) = session {
            conn.bind_session(sid);
        }
        (Arc::new(conn), rx)
    }

    fn make_event(kind: EventKind, session_id: &str) -> SessionEvent {
        SessionEvent::now(kind, session_id, "anl_1", 1, json!({}))
    }

    #[tokio::test]
    async fn register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection_with_rx("c1", None);
        registry.register(conn).await;
        assert_eq!(registry.connection_count(), 1);
        registry.unregister("c1").await;
        assert_eq!(registry.connection_count(), 0);
        // Unregistering again is a no-op.
        registry.unregister("c1").await;
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn session_scoped_delivery() {
        let registry = ConnectionRegistry::new();
        let (c1, mut rx1) = make_connection_with_rx("c1", Some("csn_a"));
        let (c2, mut rx2) = make_connection_with_rx("c2", Some("csn_b"));
        let (c3, mut rx3) = make_connection_with_rx("c3", Some("csn_a"));
        registry.register(c1).await;
        registry.register(c2).await;
        registry.register(c3).await;

        let event = make_event(EventKind::EntryUpdated, "csn_a");
        registry.deliver(&event).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx3.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn unbound_connections_receive_nothing() {
        let registry = ConnectionRegistry::new();
        let (c1, mut rx1) = make_connection_with_rx("c1", None);
        registry.register(c1).await;

        let event = make_event(EventKind::EntryUpdated, "csn_a");
        registry.deliver(&event).await;
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn risk_events_reach_analysis_watchers() {
        let registry = ConnectionRegistry::new();
        // Watcher not in the session.
        let (watcher, mut watcher_rx) = make_connection_with_rx("w1", None);
        watcher.watch_analysis("anl_1");
        // Member of the session.
        let (member, mut member_rx) = make_connection_with_rx("m1", Some("csn_a"));
        registry.register(watcher).await;
        registry.register(member).await;

        let risk_event = make_event(EventKind::EntryRiskChanged, "csn_a");
        registry.deliver(&risk_event).await;
        assert!(watcher_rx.try_recv().is_ok());
        assert!(member_rx.try_recv().is_ok());

        // Content-only events do not reach watchers.
        let content_event = make_event(EventKind::EntryUpdated, "csn_a");
        registry.deliver(&content_event).await;
        assert!(watcher_rx.try_recv().is_err());
        assert!(member_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn session_member_watching_analysis_receives_once() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = make_connection_with_rx("c1", Some("csn_a"));
        conn.watch_analysis("anl_1");
        registry.register(conn).await;

        let event = make_event(EventKind::EntryRiskChanged, "csn_a");
        registry.deliver(&event).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "event must not be double-sent");
    }

    #[tokio::test]
    async fn delivered_json_matches_wire_shape() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = make_connection_with_rx("c1", Some("csn_a"));
        registry.register(conn).await;

        let event = SessionEvent::now(
            EventKind::EntryCreated,
            "csn_a",
            "anl_1",
            7,
            json!({"entry": {"id": "ent_1"}}),
        );
        registry.deliver(&event).await;

        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "entry.created");
        assert_eq!(parsed["sessionId"], "csn_a");
        assert_eq!(parsed["sequence"], 7);
        assert_eq!(parsed["data"]["entry"]["id"], "ent_1");
    }

    #[tokio::test]
    async fn slow_client_disconnected_after_threshold() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let slow = Arc::new(ClientConnection::new("slow".into(), None, tx));
        slow.bind_session("csn_a");
        let (fast, mut fast_rx) = make_connection_with_rx("fast", Some("csn_a"));
        registry.register(slow).await;
        registry.register(fast).await;

        let event = make_event(EventKind::EntryUpdated, "csn_a");
        // First send fills the slow client's buffer, then exceed threshold.
        for _ in 0..=MAX_TOTAL_DROPS {
            registry.deliver(&event).await;
        }

        assert_eq!(registry.connection_count(), 1);
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn slow_client_never_fails_delivery_to_others() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let slow = Arc::new(ClientConnection::new("slow".into(), None, tx));
        slow.bind_session("csn_a");
        let (fast, mut fast_rx) = make_connection_with_rx("fast", Some("csn_a"));
        registry.register(slow).await;
        registry.register(fast).await;

        let event = make_event(EventKind::EntryUpdated, "csn_a");
        for _ in 0..10 {
            registry.deliver(&event).await;
            assert!(fast_rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn session_connections_lookup() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = make_connection_with_rx("c1", Some("csn_a"));
        let (c2, _rx2) = make_connection_with_rx("c2", Some("csn_b"));
        registry.register(c1).await;
        registry.register(c2).await;

        assert_eq!(registry.session_connections("csn_a").await.len(), 1);
        assert!(registry.session_connections("csn_none").await.is_empty());
    }

    #[test]
    fn slow_client_threshold_constant_value() {
        assert_eq!(MAX_TOTAL_DROPS, 100);
    }
}
