//! Event bridge — drains the engine's publisher channel into the
//! connection registry.
//!
//! A single consumer task preserves the per-session commit order the
//! publisher established: events are delivered to each session's
//! connections exactly in the order they were committed. A lagged
//! receiver (burst beyond channel capacity) loses the overrun events —
//! consistent with best-effort delivery, clients re-fetch state rather
//! than rely on replay.

use std::sync::Arc;

use tokio::sync::broadcast;

use hazsync_core::events::SessionEvent;

use super::registry::ConnectionRegistry;

/// Bridges engine events to WebSocket clients.
pub struct EventBridge {
    rx: broadcast::Receiver<SessionEvent>,
    registry: Arc<ConnectionRegistry>,
}

impl EventBridge {
    /// Create a new event bridge.
    pub fn new(rx: broadcast::Receiver<SessionEvent>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { rx, registry }
    }

    /// Run the bridge loop. Exits when the publisher is dropped.
    #[tracing::instrument(skip_all, name = "event_bridge")]
    pub async fn run(mut self) {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    tracing::debug!(
                        kind = event.kind.as_str(),
                        session_id = %event.session_id,
                        sequence = event.sequence,
                        "bridging event to clients"
                    );
                    self.registry.deliver(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event bridge lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event bridge: publisher closed, exiting");
                    break;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
