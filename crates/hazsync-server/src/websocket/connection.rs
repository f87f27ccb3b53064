//! WebSocket client connection state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Authenticated user, fixed at upgrade time (`None` = anonymous).
    pub user_id: Option<String>,
    /// Bound collaboration session (set after a successful `session.join`).
    session_id: Mutex<Option<String>>,
    /// Analyses whose aggregate view this connection watches.
    watched_analyses: Mutex<HashSet<String>>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded to the last ping.
    pub is_alive: AtomicBool,
    /// Count of messages dropped due to full channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, user_id: Option<String>, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            user_id,
            session_id: Mutex::new(None),
            watched_analyses: Mutex::new(HashSet::new()),
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Bind this connection to a session.
    pub fn bind_session(&self, session_id: impl Into<String>) {
        *self.session_id.lock() = Some(session_id.into());
    }

    /// Clear the session binding.
    pub fn unbind_session(&self) {
        *self.session_id.lock() = None;
    }

    /// Get the current bound session ID.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Start watching an analysis's aggregate view.
    pub fn watch_analysis(&self, analysis_id: impl Into<String>) {
        let _ = self.watched_analyses.lock().insert(analysis_id.into());
    }

    /// Stop watching an analysis.
    pub fn unwatch_analysis(&self, analysis_id: &str) {
        let _ = self.watched_analyses.lock().remove(analysis_id);
    }

    /// Whether this connection watches the given analysis.
    pub fn watches_analysis(&self, analysis_id: &str) -> bool {
        self.watched_analyses.lock().contains(analysis_id)
    }

    /// Send a text message to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter. Never blocks: a slow client drops
    /// events rather than stalling the sender.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
