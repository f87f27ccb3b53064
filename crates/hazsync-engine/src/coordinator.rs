//! Entry Mutation Coordinator — the optimistic-concurrency gatekeeper for
//! all entry create/update/delete/risk-change operations.
//!
//! Every mutation passes the same gates: the collaboration session must be
//! active, the caller must hold project access, and the owning analysis
//! must be in an editable status. Conflict detection is per-entry and
//! version-based — concurrent mutations to different entries never
//! contend, and concurrent mutations to the same entry resolve with
//! exactly one winner per version step (losers receive the current
//! server-side row for reconciliation).
//!
//! Committed mutations are emitted through the [`EventPublisher`] inside
//! the per-session order lock, so connections observe events in commit
//! order. Risk-affecting writes carry the aggregate recomputed in the same
//! transaction as the entry write.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, instrument};

use hazsync_core::events::EventKind;
use hazsync_core::status::SessionStatus;
use hazsync_store::{
    CollabStore, CreateEntryOptions, EntryPatch, EntryRow, RiskAggregate, SessionRow,
};

use crate::collaborators::{AnalysisRef, Collaborators};
use crate::errors::{EngineError, Result};
use crate::publisher::{EventPublisher, PendingEvent};

/// Fields for a new entry.
#[derive(Clone, Debug)]
pub struct CreateEntryParams {
    /// Owning analysis; must match the session's analysis.
    pub analysis_id: String,
    /// Node within the analysis's document.
    pub node_id: String,
    /// HazOps guide word.
    pub guide_word: String,
    /// Process parameter.
    pub parameter: String,
    /// Deviation scenario.
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
}

/// Entry mutation component.
pub struct EntryCoordinator {
    store: Arc<CollabStore>,
    collaborators: Collaborators,
    publisher: Arc<EventPublisher>,
}

impl EntryCoordinator {
    /// Build a coordinator.
    pub fn new(
        store: Arc<CollabStore>,
        collaborators: Collaborators,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            store,
            collaborators,
            publisher,
        }
    }

    /// Create an entry at version 1 and emit `entry.created`.
    #[instrument(skip(self, params), fields(session_id, user_id, node_id = %params.node_id))]
    pub fn create_entry(
        &self,
        session_id: &str,
        user_id: &str,
        params: &CreateEntryParams,
    ) -> Result<(EntryRow, RiskAggregate)> {
        let session = self.gate_session(session_id)?;
        if params.analysis_id != session.analysis_id {
            return Err(EngineError::Validation(format!(
                "entry analysis {} does not match session analysis {}",
                params.analysis_id, session.analysis_id
            )));
        }
        let analysis = self.gate_analysis(user_id, &session.analysis_id)?;

        for (field, value) in [
            ("guideWord", &params.guide_word),
            ("parameter", &params.parameter),
            ("deviation", &params.deviation),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::Validation(format!("{field} is required")));
            }
        }

        if !self
            .collaborators
            .analyses
            .node_in_document(&params.node_id, &analysis.document_id)?
        {
            return Err(EngineError::NotFound {
                kind: "node",
                id: params.node_id.clone(),
            });
        }

        self.publisher.commit_and_publish(session_id, || {
            let (entry, aggregate) = self.store.create_entry(&CreateEntryOptions {
                analysis_id: &params.analysis_id,
                node_id: &params.node_id,
                guide_word: &params.guide_word,
                parameter: &params.parameter,
                deviation: &params.deviation,
                causes: &params.causes,
                consequences: &params.consequences,
                safeguards: &params.safeguards,
                recommendations: &params.recommendations,
                notes: params.notes.as_deref(),
                created_by: user_id,
            })?;
            debug!(entry_id = %entry.id, "entry created");
            let event = PendingEvent::new(
                EventKind::EntryCreated,
                entry.analysis_id.clone(),
                json!({ "entry": &entry, "aggregate": &aggregate }),
            );
            Ok(((entry, aggregate), vec![event]))
        })
    }

    /// Version-checked update. On a stale `base_version` the result is
    /// [`EngineError::VersionConflict`] carrying the current row; retry is
    /// the caller's responsibility. Emits `entry.updated` on success.
    #[instrument(skip(self, patch), fields(session_id, user_id, entry_id, base_version))]
    pub fn update_entry(
        &self,
        session_id: &str,
        user_id: &str,
        entry_id: &str,
        base_version: i64,
        patch: &EntryPatch,
    ) -> Result<EntryRow> {
        let session = self.gate_session(session_id)?;
        let entry = self.gate_entry(entry_id, &session)?;
        let _ = self.gate_analysis(user_id, &entry.analysis_id)?;

        self.publisher.commit_and_publish(session_id, || {
            let updated = self
                .store
                .update_entry(entry_id, base_version, patch, user_id)?;
            let event = PendingEvent::new(
                EventKind::EntryUpdated,
                updated.analysis_id.clone(),
                json!({ "entry": &updated }),
            );
            Ok((updated, vec![event]))
        })
    }

    /// Delete an entry and emit `entry.deleted` with the post-delete
    /// aggregate.
    #[instrument(skip(self), fields(session_id, user_id, entry_id))]
    pub fn delete_entry(
        &self,
        session_id: &str,
        user_id: &str,
        entry_id: &str,
    ) -> Result<(EntryRow, RiskAggregate)> {
        let session = self.gate_session(session_id)?;
        let entry = self.gate_entry(entry_id, &session)?;
        let _ = self.gate_analysis(user_id, &entry.analysis_id)?;

        self.publisher.commit_and_publish(session_id, || {
            let (deleted, aggregate) = self.store.delete_entry(entry_id)?;
            let event = PendingEvent::new(
                EventKind::EntryDeleted,
                deleted.analysis_id.clone(),
                json!({
                    "entryId": &deleted.id,
                    "version": deleted.version,
                    "aggregate": &aggregate,
                }),
            );
            Ok(((deleted, aggregate), vec![event]))
        })
    }

    /// Assess an entry's risk. Validates the factors, computes the rank,
    /// bumps the version, and recomputes the aggregate in the same commit;
    /// emits `entry.risk_changed` carrying both.
    #[instrument(skip(self), fields(session_id, user_id, entry_id, severity, likelihood))]
    pub fn update_entry_risk(
        &self,
        session_id: &str,
        user_id: &str,
        entry_id: &str,
        severity: u8,
        likelihood: u8,
    ) -> Result<(EntryRow, RiskAggregate)> {
        let session = self.gate_session(session_id)?;
        let entry = self.gate_entry(entry_id, &session)?;
        let _ = self.gate_analysis(user_id, &entry.analysis_id)?;

        let (severity, likelihood) = self
            .collaborators
            .risk
            .validate_factors(severity, likelihood)?;
        let rank = self.collaborators.risk.rank(severity, likelihood);

        self.publisher.commit_and_publish(session_id, || {
            let (updated, aggregate) = self.store.set_entry_risk(
                entry_id,
                Some(severity.value()),
                Some(likelihood.value()),
                Some(rank.as_str()),
                user_id,
            )?;
            let event = PendingEvent::new(
                EventKind::EntryRiskChanged,
                updated.analysis_id.clone(),
                json!({ "entry": &updated, "aggregate": &aggregate }),
            );
            Ok(((updated, aggregate), vec![event]))
        })
    }

    /// Clear an entry's risk assessment. Bumps the version and recomputes
    /// the aggregate in the same commit; emits `entry.risk_changed`.
    #[instrument(skip(self), fields(session_id, user_id, entry_id))]
    pub fn clear_entry_risk(
        &self,
        session_id: &str,
        user_id: &str,
        entry_id: &str,
    ) -> Result<(EntryRow, RiskAggregate)> {
        let session = self.gate_session(session_id)?;
        let entry = self.gate_entry(entry_id, &session)?;
        let _ = self.gate_analysis(user_id, &entry.analysis_id)?;

        self.publisher.commit_and_publish(session_id, || {
            let (updated, aggregate) =
                self.store.set_entry_risk(entry_id, None, None, None, user_id)?;
            let event = PendingEvent::new(
                EventKind::EntryRiskChanged,
                updated.analysis_id.clone(),
                json!({ "entry": &updated, "aggregate": &aggregate }),
            );
            Ok(((updated, aggregate), vec![event]))
        })
    }

    /// Entries of an analysis in creation order (state re-fetch after
    /// reconnect).
    pub fn list_entries(&self, analysis_id: &str) -> Result<Vec<EntryRow>> {
        Ok(self.store.list_entries(analysis_id)?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Gates
    // ─────────────────────────────────────────────────────────────────────

    fn gate_session(&self, session_id: &str) -> Result<SessionRow> {
        let session = self
            .store
            .find_session(session_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            })?;
        let status = session.parsed_status().map_err(|e| {
            EngineError::Storage(hazsync_store::StoreError::Internal(e.to_string()))
        })?;
        if status != SessionStatus::Active {
            return Err(EngineError::Conflict(format!(
                "session {session_id} is {status}"
            )));
        }
        Ok(session)
    }

    fn gate_entry(&self, entry_id: &str, session: &SessionRow) -> Result<EntryRow> {
        let entry = self
            .store
            .find_entry(entry_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "entry",
                id: entry_id.to_string(),
            })?;
        if entry.analysis_id != session.analysis_id {
            return Err(EngineError::Validation(format!(
                "entry {entry_id} belongs to analysis {}, not this session's analysis {}",
                entry.analysis_id, session.analysis_id
            )));
        }
        Ok(entry)
    }

    fn gate_analysis(&self, user_id: &str, analysis_id: &str) -> Result<AnalysisRef> {
        let analysis = self
            .collaborators
            .analyses
            .find_analysis(analysis_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "analysis",
                id: analysis_id.to_string(),
            })?;
        if !self
            .collaborators
            .access
            .user_has_project_access(user_id, &analysis.project_id)?
        {
            return Err(EngineError::Forbidden(format!(
                "user {user_id} has no access to project {}",
                analysis.project_id
            )));
        }
        if !self.collaborators.analyses.is_editable_status(&analysis.status) {
            return Err(EngineError::AnalysisNotEditable {
                analysis_id: analysis.id.clone(),
                status: analysis.status.clone(),
            });
        }
        Ok(analysis)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
