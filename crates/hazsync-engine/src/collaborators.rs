//! External collaborator contracts.
//!
//! The engine consumes four capabilities it does not own: project access
//! checks, analysis/document state, risk ranking, and identity lookup.
//! Each is a trait seam with a store-backed implementation so the engine
//! runs end-to-end out of the box, while tests or other deployments can
//! inject their own.

use std::sync::Arc;

use hazsync_core::risk::{self, Likelihood, RiskRank, Severity};
use hazsync_store::CollabStore;

use crate::errors::{EngineError, Result};

/// Minimal analysis view the engine needs for gating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisRef {
    /// Analysis ID.
    pub id: String,
    /// Owning project (access checks key off this).
    pub project_id: String,
    /// Process document (node membership checks key off this).
    pub document_id: String,
    /// Workflow status string.
    pub status: String,
}

/// Resolved identity for participant/authorship denormalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    /// Display name.
    pub display_name: String,
    /// Email address.
    pub email: String,
}

/// Project-level access checks.
pub trait ProjectAccess: Send + Sync {
    /// Whether the user holds any access to the project.
    fn user_has_project_access(&self, user_id: &str, project_id: &str) -> Result<bool>;

    /// The user's role on the project, or `None` if not a member.
    fn user_project_role(&self, user_id: &str, project_id: &str) -> Result<Option<String>>;
}

/// Analysis and document state.
pub trait AnalysisDirectory: Send + Sync {
    /// Look up an analysis.
    fn find_analysis(&self, analysis_id: &str) -> Result<Option<AnalysisRef>>;

    /// Whether a node exists within the given document.
    fn node_in_document(&self, node_id: &str, document_id: &str) -> Result<bool>;

    /// Whether the given workflow status permits entry mutation.
    fn is_editable_status(&self, status: &str) -> bool {
        matches!(status, "draft" | "in_progress")
    }
}

/// Risk factor validation and ranking.
pub trait RiskCalculator: Send + Sync {
    /// Validate raw factors into the 1..=5 scale.
    fn validate_factors(&self, severity: u8, likelihood: u8) -> Result<(Severity, Likelihood)>;

    /// Rank a validated pair.
    fn rank(&self, severity: Severity, likelihood: Likelihood) -> RiskRank;
}

/// Identity lookup for denormalization.
pub trait IdentityDirectory: Send + Sync {
    /// Resolve a user to display name and email.
    fn lookup_user(&self, user_id: &str) -> Result<Option<UserIdentity>>;
}

/// The full collaborator set the engine components are built from.
#[derive(Clone)]
pub struct Collaborators {
    /// Project access checks.
    pub access: Arc<dyn ProjectAccess>,
    /// Analysis/document state.
    pub analyses: Arc<dyn AnalysisDirectory>,
    /// Risk validation and ranking.
    pub risk: Arc<dyn RiskCalculator>,
    /// Identity lookup.
    pub identity: Arc<dyn IdentityDirectory>,
}

impl Collaborators {
    /// Store-backed collaborator set over the directory tables, with the
    /// matrix risk calculator.
    pub fn store_backed(store: Arc<CollabStore>) -> Self {
        let directory = Arc::new(DirectoryStore::new(store));
        Self {
            access: Arc::clone(&directory) as Arc<dyn ProjectAccess>,
            analyses: Arc::clone(&directory) as Arc<dyn AnalysisDirectory>,
            identity: directory as Arc<dyn IdentityDirectory>,
            risk: Arc::new(MatrixRiskCalculator),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store-backed implementations
// ─────────────────────────────────────────────────────────────────────────────

/// Implements the directory-shaped contracts over the store's directory
/// tables (`analyses`, `analysis_nodes`, `users`, `project_members`).
pub struct DirectoryStore {
    store: Arc<CollabStore>,
}

impl DirectoryStore {
    /// Wrap a store.
    pub fn new(store: Arc<CollabStore>) -> Self {
        Self { store }
    }
}

impl ProjectAccess for DirectoryStore {
    fn user_has_project_access(&self, user_id: &str, project_id: &str) -> Result<bool> {
        Ok(self.store.member_role(project_id, user_id)?.is_some())
    }

    fn user_project_role(&self, user_id: &str, project_id: &str) -> Result<Option<String>> {
        Ok(self.store.member_role(project_id, user_id)?)
    }
}

impl AnalysisDirectory for DirectoryStore {
    fn find_analysis(&self, analysis_id: &str) -> Result<Option<AnalysisRef>> {
        Ok(self.store.find_analysis(analysis_id)?.map(|row| AnalysisRef {
            id: row.id,
            project_id: row.project_id,
            document_id: row.document_id,
            status: row.status,
        }))
    }

    fn node_in_document(&self, node_id: &str, document_id: &str) -> Result<bool> {
        Ok(self.store.node_in_document(node_id, document_id)?)
    }
}

impl IdentityDirectory for DirectoryStore {
    fn lookup_user(&self, user_id: &str) -> Result<Option<UserIdentity>> {
        Ok(self.store.find_user(user_id)?.map(|row| UserIdentity {
            display_name: row.display_name,
            email: row.email,
        }))
    }
}

/// The 5×5 severity × likelihood matrix calculator.
pub struct MatrixRiskCalculator;

impl RiskCalculator for MatrixRiskCalculator {
    fn validate_factors(&self, severity: u8, likelihood: u8) -> Result<(Severity, Likelihood)> {
        let severity =
            Severity::new(severity).map_err(|e| EngineError::Validation(e.to_string()))?;
        let likelihood =
            Likelihood::new(likelihood).map_err(|e| EngineError::Validation(e.to_string()))?;
        Ok((severity, likelihood))
    }

    fn rank(&self, severity: Severity, likelihood: Likelihood) -> RiskRank {
        risk::rank(severity, likelihood)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hazsync_store::{AnalysisRow, NodeRow, UserRow};

    fn store_with_fixtures() -> Arc<CollabStore> {
        let store = Arc::new(CollabStore::in_memory().unwrap());
        store
            .upsert_analysis(&AnalysisRow {
                id: "anl_1".into(),
                project_id: "prj_1".into(),
                document_id: "doc_1".into(),
                status: "draft".into(),
            })
            .unwrap();
        store
            .upsert_node(&NodeRow {
                id: "nod_1".into(),
                document_id: "doc_1".into(),
                name: "Column C-1".into(),
            })
            .unwrap();
        store
            .upsert_user(&UserRow {
                id: "usr_1".into(),
                display_name: "Ada".into(),
                email: "ada@example.com".into(),
            })
            .unwrap();
        store.add_project_member("prj_1", "usr_1", "analyst").unwrap();
        store
    }

    #[test]
    fn store_backed_access_checks() {
        let collab = Collaborators::store_backed(store_with_fixtures());
        assert!(collab.access.user_has_project_access("usr_1", "prj_1").unwrap());
        assert!(!collab.access.user_has_project_access("usr_2", "prj_1").unwrap());
        assert_eq!(
            collab.access.user_project_role("usr_1", "prj_1").unwrap().as_deref(),
            Some("analyst")
        );
    }

    #[test]
    fn store_backed_analysis_lookup() {
        let collab = Collaborators::store_backed(store_with_fixtures());
        let analysis = collab.analyses.find_analysis("anl_1").unwrap().unwrap();
        assert_eq!(analysis.project_id, "prj_1");
        assert!(collab.analyses.node_in_document("nod_1", "doc_1").unwrap());
        assert!(collab.analyses.find_analysis("anl_missing").unwrap().is_none());
    }

    #[test]
    fn editable_status_defaults() {
        let collab = Collaborators::store_backed(store_with_fixtures());
        assert!(collab.analyses.is_editable_status("draft"));
        assert!(collab.analyses.is_editable_status("in_progress"));
        assert!(!collab.analyses.is_editable_status("approved"));
    }

    #[test]
    fn identity_lookup() {
        let collab = Collaborators::store_backed(store_with_fixtures());
        let identity = collab.identity.lookup_user("usr_1").unwrap().unwrap();
        assert_eq!(identity.display_name, "Ada");
        assert_eq!(identity.email, "ada@example.com");
        assert!(collab.identity.lookup_user("usr_ghost").unwrap().is_none());
    }

    #[test]
    fn matrix_calculator_validates_and_ranks() {
        let calc = MatrixRiskCalculator;
        let (s, l) = calc.validate_factors(5, 4).unwrap();
        assert_eq!(calc.rank(s, l), RiskRank::High);

        let err = calc.validate_factors(0, 3).unwrap_err();
        assert_matches!(err, EngineError::Validation(_));
        let err = calc.validate_factors(3, 6).unwrap_err();
        assert_matches!(err, EngineError::Validation(_));
    }
}
