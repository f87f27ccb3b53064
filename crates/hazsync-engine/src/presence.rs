//! Participant Presence Tracker.
//!
//! Joins upsert on `(session_id, user_id)`, so repeated or concurrent
//! joins by one user never duplicate a roster row. Leaves soft-close the
//! row and are idempotent. Heartbeats refresh `last_activity_at` and the
//! opaque cursor payload with last-write-wins semantics. The idle sweep
//! (see [`crate::sweep`]) calls [`PresenceTracker::evict_idle`] on an
//! independent cadence.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use hazsync_core::events::EventKind;
use hazsync_core::status::SessionStatus;
use hazsync_settings::EmptySessionPolicy;
use hazsync_store::{CollabStore, JoinResult, ParticipantRow};

use crate::collaborators::Collaborators;
use crate::errors::{EngineError, Result};
use crate::publisher::{EventPublisher, PendingEvent};

/// Participant presence component.
pub struct PresenceTracker {
    store: Arc<CollabStore>,
    collaborators: Collaborators,
    publisher: Arc<EventPublisher>,
    on_empty_session: EmptySessionPolicy,
}

impl PresenceTracker {
    /// Build a tracker.
    pub fn new(
        store: Arc<CollabStore>,
        collaborators: Collaborators,
        publisher: Arc<EventPublisher>,
        on_empty_session: EmptySessionPolicy,
    ) -> Self {
        Self {
            store,
            collaborators,
            publisher,
            on_empty_session,
        }
    }

    /// Join (or rejoin) a session.
    ///
    /// Gate order: session must exist (`NotFound`), caller must hold
    /// project access to the owning analysis's project (`Forbidden`),
    /// session must be active (`Conflict`, message distinguishing ended
    /// from paused). Returns the session, the caller's participant row,
    /// and the full active roster so presence UI needs no second round
    /// trip.
    #[instrument(skip(self), fields(session_id, user_id))]
    pub fn join(&self, session_id: &str, user_id: &str) -> Result<JoinResult> {
        let session = self
            .store
            .find_session(session_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            })?;

        // Status gate comes before the access check: a join on an ended or
        // paused session is a Conflict for every caller, regardless of
        // access level. The store re-checks atomically inside the commit.
        let status = session
            .parsed_status()
            .map_err(|e| EngineError::Storage(hazsync_store::StoreError::Internal(e.to_string())))?;
        if status != SessionStatus::Active {
            return Err(EngineError::Conflict(format!(
                "session {session_id} is {status}"
            )));
        }

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

        let identity = self
            .collaborators
            .identity
            .lookup_user(user_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "user",
                id: user_id.to_string(),
            })?;

        let result = self.publisher.commit_and_publish(session_id, || {
            let result = self.store.join_participant(
                session_id,
                user_id,
                &identity.display_name,
                &identity.email,
            )?;
            let event = PendingEvent::new(
                EventKind::ParticipantJoined,
                result.session.analysis_id.clone(),
                json!({ "participant": &result.participant }),
            );
            Ok((result, vec![event]))
        })?;

        debug!(session_id, user_id, roster_len = result.roster.len(), "joined session");
        Ok(result)
    }

    /// Leave a session. Idempotent: a second leave (or a leave after
    /// eviction) succeeds without effect and emits nothing.
    #[instrument(skip(self), fields(session_id, user_id))]
    pub fn leave(&self, session_id: &str, user_id: &str) -> Result<()> {
        let left = self.publisher.commit_and_publish(session_id, || {
            let session = self
                .store
                .find_session(session_id)?
                .ok_or_else(|| EngineError::NotFound {
                    kind: "session",
                    id: session_id.to_string(),
                })?;
            let result = self.store.leave_participant(session_id, user_id)?;
            let events = if result.left_now {
                vec![PendingEvent::new(
                    EventKind::ParticipantLeft,
                    session.analysis_id.clone(),
                    json!({ "userId": user_id }),
                )]
            } else {
                vec![]
            };
            Ok((result, events))
        })?;

        if left.left_now && left.remaining_active == 0 {
            self.apply_empty_session_policy(session_id);
        }
        Ok(())
    }

    /// Refresh a participant's activity and optionally its cursor.
    /// Last write wins by timestamp; no locking. Returns `false` when
    /// there is no active participant row to refresh.
    pub fn heartbeat(
        &self,
        session_id: &str,
        user_id: &str,
        cursor_position: Option<&Value>,
    ) -> Result<bool> {
        let _ = self
            .store
            .find_session(session_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            })?;
        Ok(self
            .store
            .heartbeat_participant(session_id, user_id, cursor_position)?)
    }

    /// Active roster ordered by `joined_at` ascending. Backs `join` and
    /// independent presence polling.
    pub fn active_participants(&self, session_id: &str) -> Result<Vec<ParticipantRow>> {
        let _ = self
            .store
            .find_session(session_id)?
            .ok_or_else(|| EngineError::NotFound {
                kind: "session",
                id: session_id.to_string(),
            })?;
        Ok(self.store.active_participants(session_id)?)
    }

    /// Mark participants inactive after `threshold` of heartbeat silence.
    /// Advisory: only flips the active flag from a stale timestamp, never
    /// deletes history, and a skipped cycle merely delays eviction.
    pub fn evict_idle(&self, threshold: Duration) -> Result<usize> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(threshold)
                .map_err(|e| EngineError::Validation(format!("idle threshold out of range: {e}")))?;
        let evicted = self.store.evict_idle_participants(&cutoff.to_rfc3339())?;
        if evicted > 0 {
            info!(evicted, "idle participants marked inactive");
        }
        Ok(evicted)
    }

    /// Apply the configured policy when the roster empties. Failures are
    /// logged, never surfaced: the leave itself already committed.
    fn apply_empty_session_policy(&self, session_id: &str) {
        let target = match self.on_empty_session {
            EmptySessionPolicy::Keep => return,
            EmptySessionPolicy::Pause => SessionStatus::Paused,
            EmptySessionPolicy::End => SessionStatus::Ended,
        };
        let outcome = self.publisher.commit_and_publish(session_id, || {
            let updated = self.store.transition_session(session_id, target)?;
            let event = PendingEvent::new(
                EventKind::SessionTransitioned,
                updated.analysis_id.clone(),
                json!({ "session": &updated, "status": &updated.status }),
            );
            Ok((updated, vec![event]))
        });
        match outcome {
            Ok(_) => {
                info!(session_id, target = %target, "empty session policy applied");
                if target == SessionStatus::Ended {
                    self.publisher.forget_session(session_id);
                }
            }
            Err(err) => {
                warn!(session_id, error = %err, "empty session policy skipped");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
