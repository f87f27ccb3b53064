//! Risk Aggregation Engine.
//!
//! The aggregate is derived, never authoritative: one scan over the
//! analysis's current entries buckets each stored rank. Recomputation is
//! pure and idempotent — risk-affecting mutations invoke it inside their
//! own transaction (see the coordinator), and analysis-detail views call
//! it here on demand.

use std::sync::Arc;

use hazsync_store::{CollabStore, RiskAggregate};

use crate::errors::Result;

/// Derived risk aggregate component.
pub struct RiskAggregator {
    store: Arc<CollabStore>,
}

impl RiskAggregator {
    /// Build an aggregator.
    pub fn new(store: Arc<CollabStore>) -> Self {
        Self { store }
    }

    /// Recompute the aggregate for an analysis from its live entry set.
    pub fn recompute(&self, analysis_id: &str) -> Result<RiskAggregate> {
        Ok(self.store.risk_aggregate(analysis_id)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use hazsync_store::CreateEntryOptions;

    fn create_entry(store: &CollabStore, node_id: &str) -> String {
        store
            .create_entry(&CreateEntryOptions {
                analysis_id: "anl_1",
                node_id,
                guide_word: "more",
                parameter: "level",
                deviation: "more level in tank",
                causes: &[],
                consequences: &[],
                safeguards: &[],
                recommendations: &[],
                notes: None,
                created_by: "usr_1",
            })
            .unwrap()
            .0
            .id
    }

    #[test]
    fn recompute_is_idempotent() {
        let store = Arc::new(CollabStore::in_memory().unwrap());
        let aggregator = RiskAggregator::new(Arc::clone(&store));
        let entry_id = create_entry(&store, "nod_1");
        store
            .set_entry_risk(&entry_id, Some(5), Some(4), Some("high"), "usr_1")
            .unwrap();

        let first = aggregator.recompute("anl_1").unwrap();
        let second = aggregator.recompute("anl_1").unwrap();
        assert_eq!(first.total_entries, second.total_entries);
        assert_eq!(first.high_risk_count, second.high_risk_count);
        assert_eq!(first.high_risk_count, 1);
    }

    #[test]
    fn totals_track_live_entry_count() {
        let store = Arc::new(CollabStore::in_memory().unwrap());
        let aggregator = RiskAggregator::new(Arc::clone(&store));

        let first = create_entry(&store, "nod_1");
        let _ = create_entry(&store, "nod_2");
        assert_eq!(aggregator.recompute("anl_1").unwrap().total_entries, 2);

        store.delete_entry(&first).unwrap();
        let aggregate = aggregator.recompute("anl_1").unwrap();
        assert_eq!(aggregate.total_entries, 1);
        assert_eq!(aggregate.analyzed_node_count, 1);
        assert!(aggregate.buckets_sum_to_total());
    }
}
