//! Analysis entry repository — `analysis_entries` rows and the
//! version-checked conditional update at the heart of optimistic
//! concurrency.
//!
//! The conflict check is a single atomic `UPDATE ... WHERE id = ?1 AND
//! version = ?2`: exactly one writer wins each version step, losers see
//! zero affected rows and are reported upward as a conflict with the
//! current row attached.

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::Result;
use crate::sqlite::row_types::{EntryRow, RiskAggregate};

/// Options for creating a new entry.
pub struct CreateEntryOptions<'a> {
    /// Owning analysis.
    pub analysis_id: &'a str,
    /// Node within the analysis's document.
    pub node_id: &'a str,
    /// HazOps guide word.
    pub guide_word: &'a str,
    /// Process parameter.
    pub parameter: &'a str,
    /// Deviation scenario.
    pub deviation: &'a str,
    /// Ordered cause texts.
    pub causes: &'a [String],
    /// Ordered consequence texts.
    pub consequences: &'a [String],
    /// Ordered safeguard texts.
    pub safeguards: &'a [String],
    /// Ordered recommendation texts.
    pub recommendations: &'a [String],
    /// Free-form notes.
    pub notes: Option<&'a str>,
    /// Creating user.
    pub created_by: &'a str,
}

/// Content fields an update may patch. `None` leaves the stored value
/// unchanged.
#[derive(Clone, Debug, Default)]
pub struct EntryPatch {
    /// New guide word.
    pub guide_word: Option<String>,
    /// New parameter.
    pub parameter: Option<String>,
    /// New deviation text.
    pub deviation: Option<String>,
    /// Replacement cause list.
    pub causes: Option<Vec<String>>,
    /// Replacement consequence list.
    pub consequences: Option<Vec<String>>,
    /// Replacement safeguard list.
    pub safeguards: Option<Vec<String>>,
    /// Replacement recommendation list.
    pub recommendations: Option<Vec<String>>,
    /// New notes text.
    pub notes: Option<String>,
}

fn to_json(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

/// Entry repository — stateless, every method takes `&Connection`.
pub struct EntryRepo;

impl EntryRepo {
    const COLUMNS: &'static str = "id, analysis_id, node_id, guide_word, parameter, deviation, \
         causes, consequences, safeguards, recommendations, notes, version, \
         severity, likelihood, risk_rank, created_at, updated_at, updated_by";

    /// Create a new entry at version 1.
    pub fn create(conn: &Connection, opts: &CreateEntryOptions<'_>) -> Result<EntryRow> {
        let id = format!("ent_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO analysis_entries
               (id, analysis_id, node_id, guide_word, parameter, deviation,
                causes, consequences, safeguards, recommendations, notes,
                version, created_at, updated_at, updated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?12, ?13)",
            params![
                id,
                opts.analysis_id,
                opts.node_id,
                opts.guide_word,
                opts.parameter,
                opts.deviation,
                to_json(opts.causes),
                to_json(opts.consequences),
                to_json(opts.safeguards),
                to_json(opts.recommendations),
                opts.notes,
                now,
                opts.created_by,
            ],
        )?;
        Ok(EntryRow {
            id,
            analysis_id: opts.analysis_id.to_string(),
            node_id: opts.node_id.to_string(),
            guide_word: opts.guide_word.to_string(),
            parameter: opts.parameter.to_string(),
            deviation: opts.deviation.to_string(),
            causes: opts.causes.to_vec(),
            consequences: opts.consequences.to_vec(),
            safeguards: opts.safeguards.to_vec(),
            recommendations: opts.recommendations.to_vec(),
            notes: opts.notes.map(String::from),
            version: 1,
            severity: None,
            likelihood: None,
            risk_rank: None,
            created_at: now.clone(),
            updated_at: now,
            updated_by: opts.created_by.to_string(),
        })
    }

    /// Get entry by ID.
    pub fn get_by_id(conn: &Connection, entry_id: &str) -> Result<Option<EntryRow>> {
        let sql = format!(
            "SELECT {} FROM analysis_entries WHERE id = ?1",
            Self::COLUMNS
        );
        let row = conn
            .query_row(&sql, params![entry_id], Self::map_row)
            .optional()?;
        Ok(row)
    }

    /// All entries for an analysis in creation order.
    pub fn list_for_analysis(conn: &Connection, analysis_id: &str) -> Result<Vec<EntryRow>> {
        let sql = format!(
            "SELECT {} FROM analysis_entries WHERE analysis_id = ?1 ORDER BY created_at ASC, id ASC",
            Self::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![analysis_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Atomic conditional update: applies the patch and bumps the version
    /// by 1 only if the stored version still equals `base_version`.
    ///
    /// Returns `true` if a row changed. `false` means either the entry is
    /// gone or the version moved — the caller distinguishes by re-reading.
    pub fn update_with_version(
        conn: &Connection,
        entry_id: &str,
        base_version: i64,
        patch: &EntryPatch,
        updated_by: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut sets =
            String::from("version = version + 1, updated_at = ?1, updated_by = ?2");
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(now), Box::new(updated_by.to_owned())];

        let mut push = |sets: &mut String, column: &str, value: Box<dyn ToSql>,
                        values: &mut Vec<Box<dyn ToSql>>| {
            use std::fmt::Write;
            values.push(value);
            let _ = write!(sets, ", {column} = ?{}", values.len());
        };

        if let Some(ref v) = patch.guide_word {
            push(&mut sets, "guide_word", Box::new(v.clone()), &mut values);
        }
        if let Some(ref v) = patch.parameter {
            push(&mut sets, "parameter", Box::new(v.clone()), &mut values);
        }
        if let Some(ref v) = patch.deviation {
            push(&mut sets, "deviation", Box::new(v.clone()), &mut values);
        }
        if let Some(ref v) = patch.causes {
            push(&mut sets, "causes", Box::new(to_json(v)), &mut values);
        }
        if let Some(ref v) = patch.consequences {
            push(&mut sets, "consequences", Box::new(to_json(v)), &mut values);
        }
        if let Some(ref v) = patch.safeguards {
            push(&mut sets, "safeguards", Box::new(to_json(v)), &mut values);
        }
        if let Some(ref v) = patch.recommendations {
            push(&mut sets, "recommendations", Box::new(to_json(v)), &mut values);
        }
        if let Some(ref v) = patch.notes {
            push(&mut sets, "notes", Box::new(v.clone()), &mut values);
        }

        values.push(Box::new(entry_id.to_owned()));
        let id_idx = values.len();
        values.push(Box::new(base_version));
        let version_idx = values.len();

        let sql = format!(
            "UPDATE analysis_entries SET {sets} WHERE id = ?{id_idx} AND version = ?{version_idx}"
        );
        let params_refs: Vec<&dyn ToSql> = values.iter().map(Box::as_ref).collect();
        let changed = conn.execute(&sql, params_refs.as_slice())?;
        Ok(changed > 0)
    }

    /// Write risk fields (or clear them with `None`s) and bump the version.
    /// Unconditional on version: risk assessment is a dedicated path whose
    /// writes are serialized by the owning transaction.
    pub fn set_risk(
        conn: &Connection,
        entry_id: &str,
        severity: Option<u8>,
        likelihood: Option<u8>,
        risk_rank: Option<&str>,
        updated_by: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE analysis_entries
             SET severity = ?1, likelihood = ?2, risk_rank = ?3,
                 version = version + 1, updated_at = ?4, updated_by = ?5
             WHERE id = ?6",
            params![severity, likelihood, risk_rank, now, updated_by, entry_id],
        )?;
        Ok(changed > 0)
    }

    /// Delete an entry. Returns `true` if a row was deleted.
    pub fn delete(conn: &Connection, entry_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM analysis_entries WHERE id = ?1",
            params![entry_id],
        )?;
        Ok(changed > 0)
    }

    /// Recompute the derived risk aggregate for an analysis in one scan.
    /// Pure and idempotent — safe to call redundantly.
    pub fn aggregate(conn: &Connection, analysis_id: &str) -> Result<RiskAggregate> {
        let (total, high, medium, low, unassessed, nodes) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN risk_rank = 'high' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN risk_rank = 'medium' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN risk_rank = 'low' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN risk_rank IS NULL THEN 1 ELSE 0 END), 0),
                    COUNT(DISTINCT node_id)
             FROM analysis_entries WHERE analysis_id = ?1",
            params![analysis_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )?;
        Ok(RiskAggregate {
            analysis_id: analysis_id.to_string(),
            total_entries: total,
            high_risk_count: high,
            medium_risk_count: medium,
            low_risk_count: low,
            unassessed_count: unassessed,
            analyzed_node_count: nodes,
            computed_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
        let causes: String = row.get(6)?;
        let consequences: String = row.get(7)?;
        let safeguards: String = row.get(8)?;
        let recommendations: String = row.get(9)?;
        Ok(EntryRow {
            id: row.get(0)?,
            analysis_id: row.get(1)?,
            node_id: row.get(2)?,
            guide_word: row.get(3)?,
            parameter: row.get(4)?,
            deviation: row.get(5)?,
            causes: serde_json::from_str(&causes).unwrap_or_default(),
            consequences: serde_json::from_str(&consequences).unwrap_or_default(),
            safeguards: serde_json::from_str(&safeguards).unwrap_or_default(),
            recommendations: serde_json::from_str(&recommendations).unwrap_or_default(),
            notes: row.get(10)?,
            version: row.get(11)?,
            severity: row.get(12)?,
            likelihood: row.get(13)?,
            risk_rank: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
            updated_by: row.get(17)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn create(conn: &Connection, analysis_id: &str, node_id: &str) -> EntryRow {
        EntryRepo::create(
            conn,
            &CreateEntryOptions {
                analysis_id,
                node_id,
                guide_word: "no",
                parameter: "flow",
                deviation: "no flow from pump P-101",
                causes: &["pump trip".to_string()],
                consequences: &["loss of cooling".to_string()],
                safeguards: &[],
                recommendations: &[],
                notes: None,
                created_by: "usr_1",
            },
        )
        .unwrap()
    }

    #[test]
    fn create_starts_at_version_one() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        assert!(entry.id.starts_with("ent_"));
        assert_eq!(entry.version, 1);
        assert!(entry.severity.is_none());
        assert!(entry.risk_rank.is_none());
    }

    #[test]
    fn get_round_trips_lists() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        let found = EntryRepo::get_by_id(&conn, &entry.id).unwrap().unwrap();
        assert_eq!(found, entry);
        assert_eq!(found.causes, vec!["pump trip".to_string()]);
    }

    #[test]
    fn update_with_matching_version_wins() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        let changed = EntryRepo::update_with_version(
            &conn,
            &entry.id,
            1,
            &EntryPatch {
                notes: Some("reviewed".into()),
                ..Default::default()
            },
            "usr_2",
        )
        .unwrap();
        assert!(changed);

        let updated = EntryRepo::get_by_id(&conn, &entry.id).unwrap().unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.notes.as_deref(), Some("reviewed"));
        assert_eq!(updated.updated_by, "usr_2");
    }

    #[test]
    fn update_with_stale_version_changes_nothing() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        EntryRepo::update_with_version(&conn, &entry.id, 1, &EntryPatch::default(), "usr_1")
            .unwrap();

        // Version is now 2; a writer still holding 1 loses.
        let changed = EntryRepo::update_with_version(
            &conn,
            &entry.id,
            1,
            &EntryPatch {
                deviation: Some("stale edit".into()),
                ..Default::default()
            },
            "usr_2",
        )
        .unwrap();
        assert!(!changed);

        let current = EntryRepo::get_by_id(&conn, &entry.id).unwrap().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.deviation, "no flow from pump P-101");
    }

    #[test]
    fn versions_increment_by_exactly_one() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        for expected in 2..=6 {
            EntryRepo::update_with_version(
                &conn,
                &entry.id,
                expected - 1,
                &EntryPatch::default(),
                "usr_1",
            )
            .unwrap();
            let row = EntryRepo::get_by_id(&conn, &entry.id).unwrap().unwrap();
            assert_eq!(row.version, expected);
        }
    }

    #[test]
    fn patch_replaces_lists_wholesale() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        EntryRepo::update_with_version(
            &conn,
            &entry.id,
            1,
            &EntryPatch {
                causes: Some(vec!["valve closed".into(), "line frozen".into()]),
                safeguards: Some(vec!["low-flow alarm".into()]),
                ..Default::default()
            },
            "usr_1",
        )
        .unwrap();

        let updated = EntryRepo::get_by_id(&conn, &entry.id).unwrap().unwrap();
        assert_eq!(updated.causes.len(), 2);
        assert_eq!(updated.safeguards, vec!["low-flow alarm".to_string()]);
        // Untouched list is preserved.
        assert_eq!(updated.consequences, vec!["loss of cooling".to_string()]);
    }

    #[test]
    fn set_risk_bumps_version() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        assert!(
            EntryRepo::set_risk(&conn, &entry.id, Some(4), Some(3), Some("medium"), "usr_1")
                .unwrap()
        );
        let row = EntryRepo::get_by_id(&conn, &entry.id).unwrap().unwrap();
        assert_eq!(row.version, 2);
        assert_eq!(row.severity, Some(4));
        assert_eq!(row.likelihood, Some(3));
        assert_eq!(row.risk_rank.as_deref(), Some("medium"));
    }

    #[test]
    fn clear_risk_resets_fields() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        EntryRepo::set_risk(&conn, &entry.id, Some(5), Some(5), Some("high"), "usr_1").unwrap();
        EntryRepo::set_risk(&conn, &entry.id, None, None, None, "usr_1").unwrap();

        let row = EntryRepo::get_by_id(&conn, &entry.id).unwrap().unwrap();
        assert_eq!(row.version, 3);
        assert!(row.severity.is_none());
        assert!(row.likelihood.is_none());
        assert!(row.risk_rank.is_none());
    }

    #[test]
    fn delete_entry() {
        let conn = setup();
        let entry = create(&conn, "anl_1", "nod_1");
        assert!(EntryRepo::delete(&conn, &entry.id).unwrap());
        assert!(EntryRepo::get_by_id(&conn, &entry.id).unwrap().is_none());
        assert!(!EntryRepo::delete(&conn, &entry.id).unwrap());
    }

    #[test]
    fn list_for_analysis_in_creation_order() {
        let conn = setup();
        let first = create(&conn, "anl_1", "nod_1");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = create(&conn, "anl_1", "nod_2");
        create(&conn, "anl_other", "nod_9");

        let entries = EntryRepo::list_for_analysis(&conn, "anl_1").unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    }

    #[test]
    fn aggregate_empty_analysis() {
        let conn = setup();
        let agg = EntryRepo::aggregate(&conn, "anl_empty").unwrap();
        assert_eq!(agg.total_entries, 0);
        assert_eq!(agg.analyzed_node_count, 0);
        assert!(agg.buckets_sum_to_total());
    }

    #[test]
    fn aggregate_buckets_by_rank() {
        let conn = setup();
        let e1 = create(&conn, "anl_1", "nod_1");
        let e2 = create(&conn, "anl_1", "nod_1");
        let e3 = create(&conn, "anl_1", "nod_2");
        create(&conn, "anl_1", "nod_3"); // stays unassessed

        EntryRepo::set_risk(&conn, &e1.id, Some(5), Some(4), Some("high"), "usr_1").unwrap();
        EntryRepo::set_risk(&conn, &e2.id, Some(3), Some(3), Some("medium"), "usr_1").unwrap();
        EntryRepo::set_risk(&conn, &e3.id, Some(1), Some(2), Some("low"), "usr_1").unwrap();

        let agg = EntryRepo::aggregate(&conn, "anl_1").unwrap();
        assert_eq!(agg.total_entries, 4);
        assert_eq!(agg.high_risk_count, 1);
        assert_eq!(agg.medium_risk_count, 1);
        assert_eq!(agg.low_risk_count, 1);
        assert_eq!(agg.unassessed_count, 1);
        assert_eq!(agg.analyzed_node_count, 3);
        assert!(agg.buckets_sum_to_total());
    }

    #[test]
    fn aggregate_tracks_deletions() {
        let conn = setup();
        let e1 = create(&conn, "anl_1", "nod_1");
        create(&conn, "anl_1", "nod_2");
        EntryRepo::delete(&conn, &e1.id).unwrap();

        let agg = EntryRepo::aggregate(&conn, "anl_1").unwrap();
        assert_eq!(agg.total_entries, 1);
        assert_eq!(agg.analyzed_node_count, 1);
    }
}
