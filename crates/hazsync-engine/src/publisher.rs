//! Ordered event emission.
//!
//! [`EventPublisher`] owns the single outbound event channel and a
//! per-session sequence counter. [`EventPublisher::commit_and_publish`]
//! runs the storage commit and the emission of its events while holding
//! the session's order lock, so events leave this process in commit order
//! for each session. There is no ordering relationship across sessions.
//!
//! Emission is fire-and-forget: send errors (no live subscriber) are
//! ignored, and delivery past this channel is best-effort at-most-once —
//! reconnecting clients re-fetch state instead of replaying.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use hazsync_core::events::{EventKind, SessionEvent};

use crate::errors::Result;

/// An event produced by a commit, awaiting sequence assignment.
#[derive(Clone, Debug)]
pub struct PendingEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Analysis the event concerns.
    pub analysis_id: String,
    /// Kind-specific data.
    pub data: Value,
}

impl PendingEvent {
    /// Convenience constructor.
    pub fn new(kind: EventKind, analysis_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            analysis_id: analysis_id.into(),
            data,
        }
    }
}

/// Per-session ordered publisher over a broadcast channel.
pub struct EventPublisher {
    tx: broadcast::Sender<SessionEvent>,
    sequences: Mutex<HashMap<String, Arc<Mutex<i64>>>>,
}

impl EventPublisher {
    /// Create a publisher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to the outbound event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Run `commit` and emit its events under the session's order lock.
    ///
    /// The lock spans both the storage commit and the sends, so for any
    /// one session, event sequence numbers and channel order both match
    /// commit order even under concurrent writers.
    pub fn commit_and_publish<T>(
        &self,
        session_id: &str,
        commit: impl FnOnce() -> Result<(T, Vec<PendingEvent>)>,
    ) -> Result<T> {
        let counter = self.session_counter(session_id);
        let mut sequence = counter.lock();

        let (value, pending) = commit()?;
        for event in pending {
            *sequence += 1;
            let event = SessionEvent::now(
                event.kind,
                session_id,
                event.analysis_id,
                *sequence,
                event.data,
            );
            trace!(
                session_id,
                kind = event.kind.as_str(),
                sequence = event.sequence,
                "event emitted"
            );
            // No subscribers is fine; delivery is best-effort.
            let _ = self.tx.send(event);
        }
        Ok(value)
    }

    /// Drop the sequence counter for a finished session.
    pub fn forget_session(&self, session_id: &str) {
        let _ = self.sequences.lock().remove(session_id);
    }

    /// Current subscriber count (diagnostics).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn session_counter(&self, session_id: &str) -> Arc<Mutex<i64>> {
        let mut sequences = self.sequences.lock();
        Arc::clone(
            sequences
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(0))),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
