//! Prometheus metrics for the read-model engine.
//!
//! Registered in the default registry and exposed by the daemon's `/metrics`
//! endpoint.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, register_int_gauge};
use prometheus::{IntCounter, IntCounterVec, IntGauge};

/// Completed flush cycles
pub static FLUSH_CYCLES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("statboard_flush_cycles_total", "Completed flush cycles")
        .expect("metric can be registered")
});

/// Per-entity flush outcomes, labelled by outcome
pub static FLUSH_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "statboard_flush_entities_total",
        "Pending entities processed by flush, by outcome",
        &["outcome"]
    )
    .expect("metric can be registered")
});

/// View deltas discarded after a failed reconciliation
pub static DROPPED_VIEW_DELTA: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "statboard_dropped_view_delta_total",
        "View deltas discarded after the durable store rejected them"
    )
    .expect("metric can be registered")
});

/// Absolute like deltas discarded after a failed reconciliation
pub static DROPPED_LIKE_DELTA: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "statboard_dropped_like_delta_total",
        "Absolute like deltas discarded after the durable store rejected them"
    )
    .expect("metric can be registered")
});

/// Pending-set size observed at the start of the last flush
pub static PENDING_ENTITIES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "statboard_pending_entities",
        "Entities with unflushed deltas at the start of the last flush"
    )
    .expect("metric can be registered")
});

/// Snapshot writes, labelled accepted / suppressed
pub static SNAPSHOT_WRITES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "statboard_snapshot_writes_total",
        "Snapshot writes by watermark decision",
        &["decision"]
    )
    .expect("metric can be registered")
});

/// Record one flushed entity outcome.
pub fn record_flush_outcome(outcome: &str) {
    FLUSH_OUTCOMES.with_label_values(&[outcome]).inc();
}

/// Record snapshot writes by decision.
pub fn record_snapshot_writes(accepted: u64, suppressed: u64) {
    if accepted > 0 {
        SNAPSHOT_WRITES.with_label_values(&["accepted"]).inc_by(accepted);
    }
    if suppressed > 0 {
        SNAPSHOT_WRITES
            .with_label_values(&["suppressed"])
            .inc_by(suppressed);
    }
}

/// Force registration so `/metrics` lists every series from startup.
pub fn init() {
    Lazy::force(&FLUSH_CYCLES);
    Lazy::force(&FLUSH_OUTCOMES);
    Lazy::force(&DROPPED_VIEW_DELTA);
    Lazy::force(&DROPPED_LIKE_DELTA);
    Lazy::force(&PENDING_ENTITIES);
    Lazy::force(&SNAPSHOT_WRITES);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        init();
        init();

        let before = FLUSH_OUTCOMES.with_label_values(&["applied"]).get();
        record_flush_outcome("applied");
        assert!(FLUSH_OUTCOMES.with_label_values(&["applied"]).get() > before);

        let mut buffer = Vec::new();
        prometheus::Encoder::encode(
            &prometheus::TextEncoder::new(),
            &prometheus::gather(),
            &mut buffer,
        )
        .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("statboard_flush_cycles_total"));
        assert!(text.contains("statboard_flush_entities_total"));
    }
}
