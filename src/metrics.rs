//! Metrics surface for the metadata writer.

use parking_lot::Mutex;

use crate::catalog::TableStats;

/// Point-in-time copy of metadata writer metrics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct MetadataMetricsSnapshot {
    /// Commits applied successfully.
    pub commits: u64,
    /// Commits that failed before completion.
    pub commit_failures: u64,
    /// Completed instants erased to re-apply a retried commit.
    pub retries_repaired: u64,
    /// Records written by successful commits.
    pub records_written: u64,
    /// Compactions executed.
    pub compactions: u64,
    /// Compactions skipped because earlier data-table instants were pending.
    pub compactions_skipped: u64,
    /// Clean runs executed.
    pub cleans: u64,
    /// Compaction or clean failures.
    pub maintenance_failures: u64,
    /// Live base files after the last successful commit.
    pub base_file_count: u64,
    /// Live log blocks after the last successful commit.
    pub log_file_count: u64,
    /// Bytes held in base files after the last successful commit.
    pub total_base_bytes: u64,
    /// Bytes held in log blocks after the last successful commit.
    pub total_log_bytes: u64,
}

/// Counters and size gauges of the metadata table.
#[derive(Debug, Default)]
pub struct MetadataMetrics {
    inner: Mutex<MetadataMetricsSnapshot>,
}

impl MetadataMetrics {
    pub(crate) fn record_commit(&self, records: usize) {
        let mut guard = self.inner.lock();
        guard.commits = guard.commits.saturating_add(1);
        guard.records_written = guard.records_written.saturating_add(records as u64);
    }

    pub(crate) fn record_commit_failure(&self) {
        let mut guard = self.inner.lock();
        guard.commit_failures = guard.commit_failures.saturating_add(1);
    }

    pub(crate) fn record_retry_repaired(&self) {
        let mut guard = self.inner.lock();
        guard.retries_repaired = guard.retries_repaired.saturating_add(1);
    }

    pub(crate) fn record_compaction(&self) {
        let mut guard = self.inner.lock();
        guard.compactions = guard.compactions.saturating_add(1);
    }

    pub(crate) fn record_compaction_skipped(&self) {
        let mut guard = self.inner.lock();
        guard.compactions_skipped = guard.compactions_skipped.saturating_add(1);
    }

    pub(crate) fn record_clean(&self) {
        let mut guard = self.inner.lock();
        guard.cleans = guard.cleans.saturating_add(1);
    }

    pub(crate) fn record_maintenance_failure(&self) {
        let mut guard = self.inner.lock();
        guard.maintenance_failures = guard.maintenance_failures.saturating_add(1);
    }

    /// Replace the size gauges with freshly computed table statistics.
    pub(crate) fn update_size(&self, stats: TableStats) {
        let mut guard = self.inner.lock();
        guard.base_file_count = stats.base_file_count;
        guard.log_file_count = stats.log_file_count;
        guard.total_base_bytes = stats.total_base_bytes;
        guard.total_log_bytes = stats.total_log_bytes;
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> MetadataMetricsSnapshot {
        self.inner.lock().clone()
    }
}
