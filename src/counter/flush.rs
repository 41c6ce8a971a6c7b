//! Reconciliation of cached deltas into the durable store.
//!
//! One cycle walks the pending set. For each entity the deltas are drained
//! together with the pending-set removal in a single batch, then handed to
//! the durable store. A rejected delta is discarded and counted against the
//! entity; once the count reaches `max_retry_count` the entity is dropped
//! from the pending set without another attempt.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::cache::{take_reply, CacheKey, Pipeline};
use crate::domain::ports::EntityId;
use crate::metrics;

use super::store::CounterStore;

/// What happened to one pending entity during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Durable store accepted the deltas
    Applied,
    /// Both deltas were zero; nothing to persist
    Empty,
    /// Durable store rejected the deltas (or failed); deltas dropped
    Rejected,
    /// Retry limit already reached; removed from pending without an attempt
    SkippedRetryLimit,
    /// Pending member was not a valid id and was removed
    Discarded,
    /// A cache error left the entity pending for the next cycle
    RetrievalFailed,
}

impl FlushOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            FlushOutcome::Applied => "applied",
            FlushOutcome::Empty => "empty",
            FlushOutcome::Rejected => "rejected",
            FlushOutcome::SkippedRetryLimit => "skipped",
            FlushOutcome::Discarded => "discarded",
            FlushOutcome::RetrievalFailed => "retrieval_failed",
        }
    }
}

/// Summary of one flush cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Pending members seen at the start of the cycle
    pub pending: usize,
    pub applied: usize,
    pub empty: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub discarded: usize,
    pub retrieval_failures: usize,
    /// The pending set itself could not be read
    pub aborted: bool,
    pub duration: Duration,
}

impl FlushReport {
    fn record(&mut self, outcome: FlushOutcome) {
        match outcome {
            FlushOutcome::Applied => self.applied += 1,
            FlushOutcome::Empty => self.empty += 1,
            FlushOutcome::Rejected => self.rejected += 1,
            FlushOutcome::SkippedRetryLimit => self.skipped += 1,
            FlushOutcome::Discarded => self.discarded += 1,
            FlushOutcome::RetrievalFailed => self.retrieval_failures += 1,
        }
    }

    /// Entities that left the pending set this cycle.
    pub fn drained(&self) -> usize {
        self.applied + self.empty + self.rejected + self.skipped + self.discarded
    }
}

impl CounterStore {
    /// Run one flush cycle. Never fails: every per-entity error is logged,
    /// counted and left for the next cycle where that is safe.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> FlushReport {
        let started = Instant::now();
        let mut report = FlushReport::default();

        let members = match self.cache.smembers(&CacheKey::pending()).await {
            Ok(members) => members,
            Err(e) => {
                warn!("Failed to read pending set, skipping flush cycle: {}", e);
                report.aborted = true;
                report.duration = started.elapsed();
                self.stats.record_cycle(&report);
                return report;
            }
        };

        report.pending = members.len();
        metrics::PENDING_ENTITIES.set(members.len() as i64);

        for member in &members {
            let outcome = self.flush_member(member).await;
            metrics::record_flush_outcome(outcome.label());
            report.record(outcome);
        }

        report.duration = started.elapsed();
        self.stats.record_cycle(&report);
        metrics::FLUSH_CYCLES.inc();

        if report.pending > 0 {
            info!(
                "Flush complete: {} pending, {} applied, {} rejected, {} skipped, {} left pending ({:?})",
                report.pending,
                report.applied,
                report.rejected,
                report.skipped,
                report.retrieval_failures,
                report.duration
            );
        }
        report
    }

    async fn flush_member(&self, member: &str) -> FlushOutcome {
        let pending = CacheKey::pending();

        let id: EntityId = match member.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(member, "Discarding unparsable pending entry");
                if let Err(e) = self.cache.srem(&pending, member).await {
                    warn!(member, error = %e, "Failed to remove unparsable pending entry");
                }
                return FlushOutcome::Discarded;
            }
        };

        let failures_key = CacheKey::failures(id);
        let failures = match self.cache.get_i64(&failures_key).await {
            Ok(n) => n,
            Err(e) => {
                warn!(entity_id = %id, error = %e, "Failed to read failure counter, entity stays pending");
                return FlushOutcome::RetrievalFailed;
            }
        };

        if failures >= i64::from(self.config.max_retry_count) {
            if let Err(e) = self.cache.srem(&pending, member).await {
                warn!(entity_id = %id, error = %e, "Failed to unmark entity at retry limit");
                return FlushOutcome::RetrievalFailed;
            }
            warn!(
                entity_id = %id,
                failures,
                "Retry limit reached, skipping reconciliation"
            );
            return FlushOutcome::SkippedRetryLimit;
        }

        // Unmark and drain in one batch so a concurrent increment either lands
        // before the drain or re-marks the entity afterwards.
        let mut pipe = Pipeline::new();
        pipe.srem(pending, member);
        let view = pipe.get_del(CacheKey::view_delta(id));
        let like = pipe.get_del(CacheKey::like_delta(id));

        let drained = match self.cache.run(pipe).await {
            Ok(mut replies) => take_reply(&mut replies, view)
                .into_i64()
                .and_then(|v| take_reply(&mut replies, like).into_i64().map(|l| (v, l))),
            Err(e) => Err(e),
        };
        let (view_delta, like_delta) = match drained {
            Ok(deltas) => deltas,
            Err(e) => {
                warn!(entity_id = %id, error = %e, "Failed to drain deltas, entity stays pending");
                return FlushOutcome::RetrievalFailed;
            }
        };

        if view_delta == 0 && like_delta == 0 {
            self.clear_failures(id, &failures_key).await;
            debug!(entity_id = %id, "Nothing to reconcile");
            return FlushOutcome::Empty;
        }

        let accepted = match self.durable.apply_delta(id, view_delta, like_delta).await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(entity_id = %id, error = %e, "Durable store apply failed");
                false
            }
        };

        if accepted {
            self.clear_failures(id, &failures_key).await;
            debug!(entity_id = %id, view_delta, like_delta, "Reconciled deltas");
            return FlushOutcome::Applied;
        }

        let failures = match self.cache.incr_by(&failures_key, 1).await {
            Ok(n) => n,
            Err(e) => {
                warn!(entity_id = %id, error = %e, "Failed to record reconciliation failure");
                failures + 1
            }
        };
        self.stats.record_dropped(view_delta, like_delta);
        metrics::DROPPED_VIEW_DELTA.inc_by(view_delta.unsigned_abs());
        metrics::DROPPED_LIKE_DELTA.inc_by(like_delta.unsigned_abs());
        warn!(
            entity_id = %id,
            view_delta,
            like_delta,
            failures,
            "Durable store rejected deltas, dropping them"
        );
        FlushOutcome::Rejected
    }

    /// A zero-delta drain or an accepted apply ends the failure streak.
    async fn clear_failures(&self, id: EntityId, failures_key: &str) {
        if let Err(e) = self.cache.del(failures_key).await {
            warn!(entity_id = %id, error = %e, "Failed to clear failure counter");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::adapters::InMemoryDurableStore;
    use crate::cache::{CacheClient, InMemoryCacheStore};
    use crate::config::CounterConfig;
    use crate::domain::ports::{BaseCounts, EntityId, UserId};

    use super::*;

    fn setup(max_retry_count: u32) -> (Arc<InMemoryCacheStore>, Arc<InMemoryDurableStore>, CounterStore) {
        let cache = Arc::new(InMemoryCacheStore::new());
        let durable = Arc::new(InMemoryDurableStore::new());
        let config = CounterConfig {
            max_retry_count,
            ..Default::default()
        };
        let store = CounterStore::new(CacheClient::new(cache.clone()), durable.clone(), config);
        (cache, durable, store)
    }

    #[tokio::test]
    async fn test_flush_applies_and_clears() {
        let (_, durable, store) = setup(3);
        durable.seed(EntityId(1), BaseCounts::new(100, 10));
        for _ in 0..4 {
            store.increment_view(EntityId(1)).await.unwrap();
        }
        store.increment_like(EntityId(1), UserId(2), Some(10)).await.unwrap();

        let report = store.flush().await;

        assert_eq!(report.pending, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(durable.counts(EntityId(1)), BaseCounts::new(104, 11));
        assert!(store.pending_ids().await.unwrap().is_empty());
        assert_eq!(store.view_delta(EntityId(1)).await.unwrap(), 0);
        assert_eq!(store.failure_count(EntityId(1)).await.unwrap(), 0);
        // membership survives reconciliation
        assert!(store.has_liked(EntityId(1), UserId(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let (_, durable, store) = setup(3);
        durable.script_applies([false, true]);

        store.increment_view(EntityId(4)).await.unwrap();
        store.flush().await;
        assert_eq!(store.failure_count(EntityId(4)).await.unwrap(), 1);

        store.increment_view(EntityId(4)).await.unwrap();
        let report = store.flush().await;
        assert_eq!(report.applied, 1);
        assert_eq!(store.failure_count(EntityId(4)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_limit_skips_durable_call() {
        let (_, durable, store) = setup(2);
        durable.script_applies([false, false]);
        let id = EntityId(9);

        for _ in 0..2 {
            store.increment_view(id).await.unwrap();
            let report = store.flush().await;
            assert_eq!(report.rejected, 1);
        }
        assert_eq!(store.failure_count(id).await.unwrap(), 2);
        assert_eq!(durable.apply_calls(), 2);

        store.increment_view(id).await.unwrap();
        let report = store.flush().await;

        assert_eq!(report.skipped, 1);
        assert_eq!(durable.apply_calls(), 2);
        assert!(store.pending_ids().await.unwrap().is_empty());
        // the undrained delta stays visible to reads
        assert_eq!(store.view_delta(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_failures_allows_retry() {
        let (_, durable, store) = setup(1);
        durable.script_applies([false]);
        let id = EntityId(3);

        store.increment_view(id).await.unwrap();
        store.flush().await;
        store.increment_view(id).await.unwrap();
        assert_eq!(store.flush().await.skipped, 1);

        store.reset_failures(id).await.unwrap();
        store.increment_view(id).await.unwrap();
        assert_eq!(store.flush().await.applied, 1);
        assert_eq!(durable.counts(id).view, 2);
    }

    #[tokio::test]
    async fn test_rejected_deltas_are_dropped() {
        let (_, durable, store) = setup(3);
        durable.script_applies([false]);

        store.increment_view(EntityId(5)).await.unwrap();
        store.increment_view(EntityId(5)).await.unwrap();
        let report = store.flush().await;

        assert_eq!(report.rejected, 1);
        assert_eq!(store.view_delta(EntityId(5)).await.unwrap(), 0);
        assert!(store.pending_ids().await.unwrap().is_empty());
        assert_eq!(
            store
                .stats()
                .dropped_view_delta
                .load(std::sync::atomic::Ordering::Relaxed),
            2
        );
    }

    #[tokio::test]
    async fn test_drain_failure_leaves_entity_pending() {
        let (cache, durable, store) = setup(3);
        store.increment_view(EntityId(6)).await.unwrap();
        cache.fail_on("GETDEL", 1);

        let report = store.flush().await;

        assert_eq!(report.retrieval_failures, 1);
        assert_eq!(durable.apply_calls(), 0);
        assert_eq!(store.pending_ids().await.unwrap(), vec!["6".to_string()]);
        assert_eq!(store.view_delta(EntityId(6)).await.unwrap(), 1);

        let report = store.flush().await;
        assert_eq!(report.applied, 1);
        assert_eq!(durable.counts(EntityId(6)).view, 1);
    }

    #[tokio::test]
    async fn test_unparsable_members_are_discarded() {
        let (cache, durable, store) = setup(3);
        let client = CacheClient::new(cache.clone());
        client.sadd(&CacheKey::pending(), "not-a-number").await.unwrap();
        store.increment_view(EntityId(8)).await.unwrap();

        let report = store.flush().await;

        assert_eq!(report.discarded, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(durable.apply_calls(), 1);
        assert!(store.pending_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_net_delta_skips_durable_call() {
        let (_, durable, store) = setup(3);
        store.increment_like(EntityId(2), UserId(1), Some(0)).await.unwrap();
        store.decrement_like(EntityId(2), UserId(1), Some(0)).await.unwrap();

        let report = store.flush().await;

        assert_eq!(report.empty, 1);
        assert_eq!(report.drained(), 1);
        assert_eq!(durable.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_net_delta_resets_failure_counter() {
        let (_, durable, store) = setup(2);
        durable.script_applies([false]);
        let id = EntityId(6);

        store.increment_view(id).await.unwrap();
        assert_eq!(store.flush().await.rejected, 1);
        assert_eq!(store.failure_count(id).await.unwrap(), 1);

        store.increment_like(id, UserId(1), Some(0)).await.unwrap();
        store.decrement_like(id, UserId(1), Some(0)).await.unwrap();
        let report = store.flush().await;
        assert_eq!(report.empty, 1);
        assert_eq!(store.failure_count(id).await.unwrap(), 0);

        // one fresh failure must not reach the cap of two
        durable.script_applies([false]);
        store.increment_view(id).await.unwrap();
        assert_eq!(store.flush().await.rejected, 1);
        store.increment_view(id).await.unwrap();
        assert_eq!(store.flush().await.applied, 1);
    }

    #[tokio::test]
    async fn test_unreadable_pending_set_aborts_cycle() {
        let (cache, durable, store) = setup(3);
        store.increment_view(EntityId(1)).await.unwrap();
        cache.fail_next(1);

        let report = store.flush().await;

        assert!(report.aborted);
        assert_eq!(durable.apply_calls(), 0);
        assert_eq!(store.pending_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_durable_error_counts_as_rejection() {
        struct FailingDurable;

        #[async_trait::async_trait]
        impl crate::domain::ports::DurableCounterStore for FailingDurable {
            async fn apply_delta(&self, _: EntityId, _: i64, _: i64) -> crate::error::Result<bool> {
                Err(crate::error::Error::DurableStore("connection reset".into()))
            }
            async fn fetch_base_counts(&self, _: EntityId) -> crate::error::Result<BaseCounts> {
                Ok(BaseCounts::default())
            }
        }

        let cache = Arc::new(InMemoryCacheStore::new());
        let store = CounterStore::new(
            CacheClient::new(cache),
            Arc::new(FailingDurable),
            CounterConfig::default(),
        );
        store.increment_view(EntityId(1)).await.unwrap();

        let report = store.flush().await;
        assert_eq!(report.rejected, 1);
        assert_eq!(store.failure_count(EntityId(1)).await.unwrap(), 1);
    }
}
