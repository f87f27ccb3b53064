//! Row structs mirroring table columns.
//!
//! Rows serialize to camelCase JSON; this is the wire shape handed to
//! clients (entry snapshots in mutation events, rosters in join results),
//! so the serde derives here are part of the public contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hazsync_core::status::SessionStatus;

/// A `collaboration_sessions` row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    /// Session ID (`csn_` + UUID v7).
    pub id: String,
    /// Analysis this session collaborates on.
    pub analysis_id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Status string: "active", "paused", or "ended".
    pub status: String,
    /// User who created the session.
    pub created_by: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
    /// Set only when status is "ended".
    pub ended_at: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl SessionRow {
    /// Parse the stored status string.
    ///
    /// The schema CHECK constraint makes unknown strings unreachable from
    /// this crate's own writes; a corrupt value surfaces as an error here
    /// rather than a panic.
    pub fn parsed_status(&self) -> Result<SessionStatus, hazsync_core::status::UnknownStatus> {
        self.status.parse()
    }
}

/// A `session_participants` row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRow {
    /// Participant ID (`prt_` + UUID v7).
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// The participating user.
    pub user_id: String,
    /// Denormalized display name at join time.
    pub user_name: String,
    /// Denormalized email at join time.
    pub user_email: String,
    /// First join timestamp; preserved across rejoins.
    pub joined_at: String,
    /// Stamped on leave; `None` while present (or after idle eviction).
    pub left_at: Option<String>,
    /// Whether the participant currently counts toward the roster.
    pub is_active: bool,
    /// Opaque cursor payload, passed through unvalidated.
    pub cursor_position: Option<Value>,
    /// Refreshed by every heartbeat.
    pub last_activity_at: String,
}

/// An `analysis_entries` row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRow {
    /// Entry ID (`ent_` + UUID v7).
    pub id: String,
    /// Owning analysis.
    pub analysis_id: String,
    /// Node within the analysis's document.
    pub node_id: String,
    /// HazOps guide word (no/more/less/...).
    pub guide_word: String,
    /// Process parameter the guide word applies to.
    pub parameter: String,
    /// The deviation scenario.
    pub deviation: String,
    /// Ordered cause texts.
    pub causes: Vec<String>,
    /// Ordered consequence texts.
    pub consequences: Vec<String>,
    /// Ordered safeguard texts.
    pub safeguards: Vec<String>,
    /// Ordered recommendation texts.
    pub recommendations: Vec<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Optimistic-concurrency version; increments by exactly 1 per
    /// successful mutation.
    pub version: i64,
    /// Assessed severity (1..=5), `None` until assessed.
    pub severity: Option<u8>,
    /// Assessed likelihood (1..=5), `None` until assessed.
    pub likelihood: Option<u8>,
    /// Derived rank string ("high"/"medium"/"low"), `None` until assessed.
    pub risk_rank: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-mutation timestamp.
    pub updated_at: String,
    /// User who performed the last mutation.
    pub updated_by: String,
}

/// Derived risk aggregate for one analysis. Never stored; recomputed on
/// demand and inside risk-affecting commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAggregate {
    /// The aggregated analysis.
    pub analysis_id: String,
    /// Live entry count.
    pub total_entries: i64,
    /// Entries ranked high.
    pub high_risk_count: i64,
    /// Entries ranked medium.
    pub medium_risk_count: i64,
    /// Entries ranked low.
    pub low_risk_count: i64,
    /// Entries with no assessed rank.
    pub unassessed_count: i64,
    /// Distinct nodes with at least one entry.
    pub analyzed_node_count: i64,
    /// ISO 8601 computation timestamp.
    pub computed_at: String,
}

impl RiskAggregate {
    /// Bucket-sum invariant: high + medium + low + unassessed == total.
    pub fn buckets_sum_to_total(&self) -> bool {
        self.high_risk_count + self.medium_risk_count + self.low_risk_count + self.unassessed_count
            == self.total_entries
    }
}

/// An `analyses` directory row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRow {
    /// Analysis ID.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Process document the analysis covers.
    pub document_id: String,
    /// Workflow status ("draft", "in_review", "approved", ...).
    pub status: String,
}

/// An `analysis_nodes` directory row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRow {
    /// Node ID.
    pub id: String,
    /// Document the node belongs to.
    pub document_id: String,
    /// Display name.
    pub name: String,
}

/// A `users` directory row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    /// User ID.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Email address.
    pub email: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
