//! Live session events pushed to connected clients.
//!
//! Events are ephemeral: they are emitted at commit time, fanned out to the
//! connections of the affected session, and never persisted. A client that
//! misses events re-fetches current state after reconnecting.
//!
//! Base fields live at the top level; event-specific data is an opaque
//! [`serde_json::Value`] built by the emitter (entry snapshot, entry id,
//! fresh risk aggregate, participant row — depending on the kind).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator for session event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A new analysis entry was created.
    #[serde(rename = "entry.created")]
    EntryCreated,
    /// An entry's content fields changed.
    #[serde(rename = "entry.updated")]
    EntryUpdated,
    /// An entry was removed.
    #[serde(rename = "entry.deleted")]
    EntryDeleted,
    /// An entry's risk factors changed; data carries the fresh aggregate.
    #[serde(rename = "entry.risk_changed")]
    EntryRiskChanged,
    /// A participant joined (or rejoined) the session.
    #[serde(rename = "participant.joined")]
    ParticipantJoined,
    /// A participant left the session.
    #[serde(rename = "participant.left")]
    ParticipantLeft,
    /// The session's lifecycle status changed.
    #[serde(rename = "session.transitioned")]
    SessionTransitioned,
}

impl EventKind {
    /// Wire string for this kind (same as the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::EntryCreated => "entry.created",
            EventKind::EntryUpdated => "entry.updated",
            EventKind::EntryDeleted => "entry.deleted",
            EventKind::EntryRiskChanged => "entry.risk_changed",
            EventKind::ParticipantJoined => "participant.joined",
            EventKind::ParticipantLeft => "participant.left",
            EventKind::SessionTransitioned => "session.transitioned",
        }
    }

    /// Whether this kind affects the analysis risk aggregate view.
    pub fn is_risk_affecting(self) -> bool {
        matches!(
            self,
            EventKind::EntryCreated | EventKind::EntryDeleted | EventKind::EntryRiskChanged
        )
    }
}

/// A session event as delivered to live connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Event kind discriminator.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Session whose connections receive this event.
    pub session_id: String,
    /// Analysis the mutated state belongs to.
    pub analysis_id: String,
    /// Per-session commit sequence. Monotonic within one session's
    /// lifetime in this process; not meaningful across sessions.
    pub sequence: i64,
    /// ISO 8601 server timestamp taken at emission.
    pub timestamp: String,
    /// Kind-specific data.
    pub data: Value,
}

impl SessionEvent {
    /// Build an event stamped with the current UTC time.
    pub fn now(
        kind: EventKind,
        session_id: impl Into<String>,
        analysis_id: impl Into<String>,
        sequence: i64,
        data: Value,
    ) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            analysis_id: analysis_id.into(),
            sequence,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
