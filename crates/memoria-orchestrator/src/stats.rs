//! Process-wide ingestion counters. Atomic-counter-based since these are
//! incremented from many concurrent worker tasks and read rarely (the
//! health endpoint), not read-modify-write under a single writer.

use std::sync::atomic::{AtomicU64, Ordering};

/// In-process metrics surface exposed to the health endpoint.
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    documents_ingested: AtomicU64,
    steps_executed: AtomicU64,
    documents_failed: AtomicU64,
    documents_poisoned: AtomicU64,
}

/// Point-in-time snapshot of `OrchestratorStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub documents_ingested: u64,
    pub steps_executed: u64,
    pub documents_failed: u64,
    pub documents_poisoned: u64,
}

impl OrchestratorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ingested(&self) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_executed(&self) {
        self.steps_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poisoned(&self) {
        self.documents_poisoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            steps_executed: self.steps_executed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            documents_poisoned: self.documents_poisoned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot_reflects_recorded_events() {
        let stats = OrchestratorStats::new();
        stats.record_ingested();
        stats.record_step_executed();
        stats.record_step_executed();
        stats.record_failed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.documents_ingested, 1);
        assert_eq!(snapshot.steps_executed, 2);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.documents_poisoned, 0);
    }
}
