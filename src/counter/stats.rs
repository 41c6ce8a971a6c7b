use std::sync::atomic::{AtomicU64, Ordering};

use super::flush::FlushReport;

// =============================================================================
// Statistics
// =============================================================================

/// Cumulative flush statistics.
#[derive(Debug, Default)]
pub struct FlushStats {
    /// Completed flush cycles
    pub cycles: AtomicU64,

    /// Cycles that could not read the pending set
    pub aborted_cycles: AtomicU64,

    /// Entities whose deltas the durable store accepted
    pub applied: AtomicU64,

    /// Entities whose deltas the durable store rejected
    pub rejected: AtomicU64,

    /// Entities skipped at the retry limit
    pub skipped: AtomicU64,

    /// Unparsable pending-set members removed
    pub discarded: AtomicU64,

    /// Entities left pending after a cache error
    pub retrieval_failures: AtomicU64,

    /// Sum of view deltas lost to rejections
    pub dropped_view_delta: AtomicU64,

    /// Sum of absolute like deltas lost to rejections
    pub dropped_like_delta: AtomicU64,

    /// Total flush time (microseconds)
    pub flush_time_us: AtomicU64,
}

impl FlushStats {
    /// Fold a finished cycle into the totals.
    pub fn record_cycle(&self, report: &FlushReport) {
        if report.aborted {
            self.aborted_cycles.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.applied.fetch_add(report.applied as u64, Ordering::Relaxed);
        self.rejected.fetch_add(report.rejected as u64, Ordering::Relaxed);
        self.skipped.fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.discarded.fetch_add(report.discarded as u64, Ordering::Relaxed);
        self.retrieval_failures
            .fetch_add(report.retrieval_failures as u64, Ordering::Relaxed);
        self.flush_time_us
            .fetch_add(report.duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record deltas discarded after a rejected reconciliation.
    pub fn record_dropped(&self, view_delta: i64, like_delta: i64) {
        self.dropped_view_delta
            .fetch_add(view_delta.unsigned_abs(), Ordering::Relaxed);
        self.dropped_like_delta
            .fetch_add(like_delta.unsigned_abs(), Ordering::Relaxed);
    }

    /// Average cycle time in microseconds.
    pub fn avg_flush_time_us(&self) -> u64 {
        let cycles = self.cycles.load(Ordering::Relaxed);
        if cycles == 0 {
            0
        } else {
            self.flush_time_us.load(Ordering::Relaxed) / cycles
        }
    }
}
