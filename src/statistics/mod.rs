//! Statistics oracle: cardinality and selectivity estimates consumed by the
//! planner's cost model. Approximate by construction — callers must not
//! assume exact numbers, only that they're directionally useful.

use std::collections::HashMap;
use std::sync::RwLock;

use log::debug;

use crate::common::Oid;

pub const EQUALITY_SELECTIVITY_FALLBACK: f64 = 0.01;
pub const RANGE_SELECTIVITY: f64 = 0.33;

#[derive(Debug, Clone, Copy, Default)]
pub struct TableStats {
    pub row_count: u64,
    pub page_count: u64,
}

/// Tracks row/page counts per table via the same insert/delete event
/// callbacks the storage layer already calls on every mutation, rather
/// than scanning the heap on demand.
pub struct Statistics {
    tables: RwLock<HashMap<Oid, TableStats>>,
}

impl Statistics {
    pub fn new() -> Statistics {
        Statistics { tables: RwLock::new(HashMap::new()) }
    }

    pub fn on_table_created(&self, table_oid: Oid) {
        self.tables.write().unwrap().insert(table_oid, TableStats::default());
    }

    pub fn on_table_dropped(&self, table_oid: Oid) {
        self.tables.write().unwrap().remove(&table_oid);
    }

    pub fn on_rows_inserted(&self, table_oid: Oid, count: u64) {
        let mut tables = self.tables.write().unwrap();
        tables.entry(table_oid).or_default().row_count += count;
    }

    pub fn on_rows_deleted(&self, table_oid: Oid, count: u64) {
        let mut tables = self.tables.write().unwrap();
        if let Some(stats) = tables.get_mut(&table_oid) {
            stats.row_count = stats.row_count.saturating_sub(count);
        }
    }

    /// Refreshes `page_count` from an authoritative source (a heap walk);
    /// row counts are maintained incrementally and not touched here.
    pub fn collect_statistics(&self, table_oid: Oid, page_count: u64) {
        let mut tables = self.tables.write().unwrap();
        let stats = tables.entry(table_oid).or_default();
        stats.page_count = page_count;
        debug!("collected stats for table {}: {:?}", table_oid, stats);
    }

    pub fn table_cardinality(&self, table_oid: Oid) -> u64 {
        self.tables.read().unwrap().get(&table_oid).map(|s| s.row_count).unwrap_or(0)
    }

    pub fn get_table_stats(&self, table_oid: Oid) -> TableStats {
        self.tables.read().unwrap().get(&table_oid).copied().unwrap_or_default()
    }

    /// Falls back to a fixed constant for equality predicates (no
    /// histogram/distinct-count tracking in this engine) and a fixed
    /// constant for range predicates; any other predicate shape is assumed
    /// non-selective (matches everything).
    pub fn estimate_selectivity(&self, is_equality: bool, is_range: bool) -> f64 {
        if is_equality {
            EQUALITY_SELECTIVITY_FALLBACK
        } else if is_range {
            RANGE_SELECTIVITY
        } else {
            1.0
        }
    }
}

impl Default for Statistics {
    fn default() -> Statistics {
        Statistics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_count_tracks_inserts_and_deletes() {
        let stats = Statistics::new();
        stats.on_table_created(1);
        stats.on_rows_inserted(1, 10);
        stats.on_rows_deleted(1, 3);
        assert_eq!(stats.table_cardinality(1), 7);
    }

    #[test]
    fn dropped_table_has_zero_cardinality() {
        let stats = Statistics::new();
        stats.on_table_created(1);
        stats.on_rows_inserted(1, 5);
        stats.on_table_dropped(1);
        assert_eq!(stats.table_cardinality(1), 0);
    }

    #[test]
    fn selectivity_fallbacks() {
        let stats = Statistics::new();
        assert_eq!(stats.estimate_selectivity(true, false), EQUALITY_SELECTIVITY_FALLBACK);
        assert_eq!(stats.estimate_selectivity(false, true), RANGE_SELECTIVITY);
        assert_eq!(stats.estimate_selectivity(false, false), 1.0);
    }
}
