//! Directory repository — the tables backing the external collaborator
//! contracts: analyses, nodes, users, and project membership.
//!
//! The engine never queries these tables directly; it goes through the
//! collaborator traits, for which this repository is the store-backed
//! implementation surface.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::{AnalysisRow, NodeRow, UserRow};

/// Analysis statuses in which entries may be mutated.
pub const EDITABLE_ANALYSIS_STATUSES: &[&str] = &["draft", "in_progress"];

/// Directory repository — stateless, every method takes `&Connection`.
pub struct DirectoryRepo;

impl DirectoryRepo {
    // ── Analyses ────────────────────────────────────────────────────────

    /// Insert or replace an analysis row.
    pub fn upsert_analysis(conn: &Connection, row: &AnalysisRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO analyses (id, project_id, document_id, status)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (id) DO UPDATE SET
               project_id = excluded.project_id,
               document_id = excluded.document_id,
               status = excluded.status",
            params![row.id, row.project_id, row.document_id, row.status],
        )?;
        Ok(())
    }

    /// Get analysis by ID.
    pub fn get_analysis(conn: &Connection, analysis_id: &str) -> Result<Option<AnalysisRow>> {
        let row = conn
            .query_row(
                "SELECT id, project_id, document_id, status FROM analyses WHERE id = ?1",
                params![analysis_id],
                |row| {
                    Ok(AnalysisRow {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        document_id: row.get(2)?,
                        status: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Change an analysis's workflow status.
    pub fn set_analysis_status(conn: &Connection, analysis_id: &str, status: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE analyses SET status = ?1 WHERE id = ?2",
            params![status, analysis_id],
        )?;
        Ok(changed > 0)
    }

    /// Whether the given status permits entry mutation.
    pub fn is_editable_status(status: &str) -> bool {
        EDITABLE_ANALYSIS_STATUSES.contains(&status)
    }

    // ── Nodes ───────────────────────────────────────────────────────────

    /// Insert or replace a node row.
    pub fn upsert_node(conn: &Connection, row: &NodeRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO analysis_nodes (id, document_id, name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET
               document_id = excluded.document_id,
               name = excluded.name",
            params![row.id, row.document_id, row.name],
        )?;
        Ok(())
    }

    /// Whether a node exists within the given document.
    pub fn node_in_document(conn: &Connection, node_id: &str, document_id: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM analysis_nodes WHERE id = ?1 AND document_id = ?2)",
            params![node_id, document_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ── Users ───────────────────────────────────────────────────────────

    /// Insert or replace a user row.
    pub fn upsert_user(conn: &Connection, row: &UserRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO users (id, display_name, email)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET
               display_name = excluded.display_name,
               email = excluded.email",
            params![row.id, row.display_name, row.email],
        )?;
        Ok(())
    }

    /// Get user by ID.
    pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<UserRow>> {
        let row = conn
            .query_row(
                "SELECT id, display_name, email FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ── Project membership ──────────────────────────────────────────────

    /// Grant (or update) a user's role on a project.
    pub fn add_project_member(
        conn: &Connection,
        project_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO project_members (project_id, user_id, role)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (project_id, user_id) DO UPDATE SET role = excluded.role",
            params![project_id, user_id, role],
        )?;
        Ok(())
    }

    /// A user's role on a project, or `None` if not a member.
    pub fn member_role(
        conn: &Connection,
        project_id: &str,
        user_id: &str,
    ) -> Result<Option<String>> {
        let role = conn
            .query_row(
                "SELECT role FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(role)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
