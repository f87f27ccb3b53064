//! Session Registry — collaboration session lifecycle.
//!
//! Sessions are created lazily: the first "get or create" request for an
//! analysis materializes the active session, owned by the caller. Status
//! transitions enforce the legal map (`active` ↔ `paused`, both →
//! `ended`, `ended` terminal) and are announced to live connections.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use hazsync_core::events::EventKind;
use hazsync_core::status::SessionStatus;
use hazsync_store::{CollabStore, SessionRow};

use crate::collaborators::Collaborators;
use crate::errors::{EngineError, Result};
use crate::publisher::{EventPublisher, PendingEvent};

/// Session lifecycle component.
pub struct SessionRegistry {
    store: Arc<CollabStore>,
    collaborators: Collaborators,
    publisher: Arc<EventPublisher>,
}

impl SessionRegistry {
    /// Build a registry.
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

    /// Return the active session for an analysis, creating one owned by
    /// the caller if none exists.
    #[instrument(skip(self), fields(analysis_id, user_id))]
    pub fn get_or_create_active(
        &self,
        analysis_id: &str,
        user_id: &str,
        name: Option<&str>,
    ) -> Result<(SessionRow, bool)> {
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

        let (session, created) = self
            .store
            .get_or_create_active_session(analysis_id, user_id, name)?;
        if created {
            info!(session_id = %session.id, analysis_id, "collaboration session opened");
        }
        Ok((session, created))
    }

    /// Look up a session; absent sessions are a typed `NotFound`.
    pub fn find_session(&self, session_id: &str) -> Result<SessionRow> {
        self.store
            .find_session(session_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            })
    }

    /// Transition a session's status. The caller must hold project access
    /// to the project owning the session's analysis.
    #[instrument(skip(self), fields(session_id, user_id, target = %target))]
    pub fn transition(
        &self,
        session_id: &str,
        user_id: &str,
        target: SessionStatus,
    ) -> Result<SessionRow> {
        let session = self.find_session(session_id)?;
        let analysis = self
            .collaborators
            .analyses
            .find_analysis(&session.analysis_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "analysis",
                id: session.analysis_id.clone(),
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

        let updated = self.publisher.commit_and_publish(session_id, || {
            let updated = self.store.transition_session(session_id, target)?;
            let event = PendingEvent::new(
                EventKind::SessionTransitioned,
                updated.analysis_id.clone(),
                json!({
                    "session": &updated,
                    "status": &updated.status,
                }),
            );
            Ok((updated, vec![event]))
        })?;

        if target == SessionStatus::Ended {
            self.publisher.forget_session(session_id);
        }
        Ok(updated)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
