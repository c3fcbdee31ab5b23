//! Metrics registry
//!
//! - Counters only (no gauges, no histograms)
//! - Monotonic increase
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one executor
///
/// All counters use Relaxed atomics; a snapshot taken while queries run
/// may mix values from before and after a given query.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_executed: AtomicU64,
    queries_failed: AtomicU64,
    queries_cancelled: AtomicU64,
    stages_executed: AtomicU64,
    /// Rows fed into filter stages
    rows_scanned: AtomicU64,
    /// Rows surviving filter stages
    rows_selected: AtomicU64,
    join_rows_emitted: AtomicU64,
    groups_emitted: AtomicU64,
    rows_sorted: AtomicU64,
    cardinality_warnings: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_failed(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_cancelled(&self) {
        self.queries_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stages(&self) {
        self.stages_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one filter stage
    pub fn add_selection(&self, scanned: u64, selected: u64) {
        self.rows_scanned.fetch_add(scanned, Ordering::Relaxed);
        self.rows_selected.fetch_add(selected, Ordering::Relaxed);
    }

    pub fn add_join_rows(&self, rows: u64) {
        self.join_rows_emitted.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_groups(&self, groups: u64) {
        self.groups_emitted.fetch_add(groups, Ordering::Relaxed);
    }

    pub fn add_rows_sorted(&self, rows: u64) {
        self.rows_sorted.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_cardinality_warnings(&self) {
        self.cardinality_warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            queries_cancelled: self.queries_cancelled.load(Ordering::Relaxed),
            stages_executed: self.stages_executed.load(Ordering::Relaxed),
            rows_scanned: self.rows_scanned.load(Ordering::Relaxed),
            rows_selected: self.rows_selected.load(Ordering::Relaxed),
            join_rows_emitted: self.join_rows_emitted.load(Ordering::Relaxed),
            groups_emitted: self.groups_emitted.load(Ordering::Relaxed),
            rows_sorted: self.rows_sorted.load(Ordering::Relaxed),
            cardinality_warnings: self.cardinality_warnings.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub queries_executed: u64,
    pub queries_failed: u64,
    pub queries_cancelled: u64,
    pub stages_executed: u64,
    pub rows_scanned: u64,
    pub rows_selected: u64,
    pub join_rows_emitted: u64,
    pub groups_emitted: u64,
    pub rows_sorted: u64,
    pub cardinality_warnings: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_queries_executed();
        registry.increment_queries_failed();
        registry.increment_stages();
        registry.increment_stages();
        registry.add_selection(100, 25);
        registry.add_join_rows(7);
        registry.add_groups(3);
        registry.add_rows_sorted(3);
        registry.increment_cardinality_warnings();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.queries_executed, 1);
        assert_eq!(snapshot.queries_failed, 1);
        assert_eq!(snapshot.stages_executed, 2);
        assert_eq!(snapshot.rows_scanned, 100);
        assert_eq!(snapshot.rows_selected, 25);
        assert_eq!(snapshot.join_rows_emitted, 7);
        assert_eq!(snapshot.groups_emitted, 3);
        assert_eq!(snapshot.rows_sorted, 3);
        assert_eq!(snapshot.cardinality_warnings, 1);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_selection(1234, 10);
        registry.increment_queries_executed();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["rows_scanned"], 1234);
        assert_eq!(parsed["queries_executed"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_stages();
                    reg.add_rows_sorted(2);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.stages_executed, 1000);
        assert_eq!(snapshot.rows_sorted, 2000);
    }
}
