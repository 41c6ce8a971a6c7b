//! Statboard Integration Tests
//!
//! End-to-end behaviour over the public API:
//! - Feature 1: Write-behind counters and reconciliation
//! - Feature 2: Time-windowed rankings and cursor pagination
//! - Feature 3: Idempotent snapshots
//! - Feature 4: Event projection
//! - Feature 5: Configuration

use std::sync::Arc;

use statboard::adapters::InMemoryDurableStore;
use statboard::{
    BaseCounts, CacheClient, CounterConfig, CounterStore, EntityId, InMemoryCacheStore, RankingConfig,
    RankingStore, UserId,
};

struct Harness {
    cache: Arc<InMemoryCacheStore>,
    durable: Arc<InMemoryDurableStore>,
    client: CacheClient,
}

impl Harness {
    fn new() -> Self {
        let cache = Arc::new(InMemoryCacheStore::new());
        Self {
            client: CacheClient::new(cache.clone()),
            cache,
            durable: Arc::new(InMemoryDurableStore::new()),
        }
    }

    fn counters(&self, max_retry_count: u32) -> CounterStore {
        let config = CounterConfig {
            max_retry_count,
            ..Default::default()
        };
        CounterStore::new(self.client.clone(), self.durable.clone(), config)
    }

    fn rankings(&self) -> RankingStore {
        RankingStore::new(self.client.clone(), RankingConfig::default())
    }
}

// =============================================================================
// Feature 1: Write-Behind Counters
// =============================================================================

mod counter_tests {
    use super::*;
    use assert_matches::assert_matches;
    use statboard::{CounterBaseline, Counters, Error};

    #[tokio::test]
    async fn test_read_after_write_without_flush() {
        let h = Harness::new();
        let counters = h.counters(3);
        let id = EntityId(10);

        counters.increment_like(id, UserId(1), Some(10)).await.unwrap();
        for _ in 0..5 {
            counters.increment_view(id).await.unwrap();
        }

        let got = counters.get_counters(id, Some(UserId(1)), Some(100), Some(10)).await.unwrap();
        assert_eq!(
            got,
            Counters {
                view_count: 105,
                like_count: 11,
                user_liked: true
            }
        );
    }

    #[tokio::test]
    async fn test_domain_errors_are_not_transport_errors() {
        let h = Harness::new();
        let counters = h.counters(3);

        counters.increment_like(EntityId(1), UserId(1), Some(0)).await.unwrap();
        let err = counters
            .increment_like(EntityId(1), UserId(1), Some(0))
            .await
            .unwrap_err();
        assert!(err.is_domain_violation());
        assert!(!err.is_transport());

        h.cache.set_offline(true);
        let err = counters.increment_view(EntityId(1)).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_unlike_without_like() {
        let h = Harness::new();
        let counters = h.counters(3);

        assert_matches!(
            counters.decrement_like(EntityId(1), UserId(1), None).await,
            Err(Error::InvalidOperation(_))
        );
    }

    #[tokio::test]
    async fn test_bulk_read_in_one_round_trip() {
        let h = Harness::new();
        let counters = h.counters(3);
        counters.increment_view(EntityId(1)).await.unwrap();

        let before = h.cache.stats().batches;
        let entries: Vec<_> = (1..=10u64).map(|id| CounterBaseline::new(EntityId(id), 5, 0)).collect();
        let result = counters.get_bulk_counters(&entries, None).await.unwrap();

        assert_eq!(h.cache.stats().batches, before + 1);
        assert_eq!(result.len(), 10);
        assert_eq!(result[0].view_count, 6);
        assert!(result[1..].iter().all(|c| c.view_count == 5));
    }

    #[tokio::test]
    async fn test_flush_reconciles_into_durable_store() {
        let h = Harness::new();
        let counters = h.counters(3);
        h.durable.seed(EntityId(1), BaseCounts::new(100, 10));

        for _ in 0..3 {
            counters.increment_view(EntityId(1)).await.unwrap();
        }
        counters.increment_like(EntityId(1), UserId(4), None).await.unwrap();

        let report = counters.flush().await;
        assert_eq!(report.applied, 1);
        assert!(counters.pending_ids().await.unwrap().is_empty());

        let got = counters.get_counters(EntityId(1), Some(UserId(4)), None, None).await.unwrap();
        assert_eq!((got.view_count, got.like_count), (103, 11));
        assert!(got.user_liked);
    }

    #[tokio::test]
    async fn test_bounded_retry_then_drop() {
        let h = Harness::new();
        let counters = h.counters(2);
        h.durable.script_applies([false, false]);
        let id = EntityId(77);

        counters.increment_view(id).await.unwrap();
        counters.flush().await;
        counters.increment_view(id).await.unwrap();
        counters.flush().await;
        assert_eq!(counters.failure_count(id).await.unwrap(), 2);

        counters.increment_view(id).await.unwrap();
        let report = counters.flush().await;

        assert_eq!(report.skipped, 1);
        assert_eq!(h.durable.apply_calls(), 2);
        assert!(counters.pending_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_survives_cache_outage() {
        let h = Harness::new();
        let counters = h.counters(3);
        counters.increment_view(EntityId(1)).await.unwrap();

        h.cache.set_offline(true);
        let report = counters.flush().await;
        assert!(report.aborted);

        h.cache.set_offline(false);
        let report = counters.flush().await;
        assert_eq!(report.applied, 1);
        assert_eq!(h.durable.counts(EntityId(1)).view, 1);
    }

    #[tokio::test]
    async fn test_concurrent_views_are_all_counted() {
        let h = Harness::new();
        let counters = Arc::new(h.counters(3));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let counters = counters.clone();
                tokio::spawn(async move {
                    for _ in 0..25 {
                        counters.increment_view(EntityId(5)).await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(counters.view_delta(EntityId(5)).await.unwrap(), 400);
        counters.flush().await;
        assert_eq!(h.durable.counts(EntityId(5)).view, 400);
    }
}

// =============================================================================
// Feature 2: Rankings
// =============================================================================

mod ranking_tests {
    use super::*;
    use chrono::{Duration, Utc};
    use statboard::{Metric, RankingList, TimeWindow};

    #[tokio::test]
    async fn test_windowed_cursor_pages() {
        let h = Harness::new();
        let rankings = h.rankings();
        let created_at = Utc::now() - Duration::hours(1);

        for (id, likes) in [(1u64, 3.0), (2, 9.0), (3, 7.0), (4, 1.0), (5, 5.0)] {
            rankings
                .add_to_windowed_list(Metric::Likes, TimeWindow::Day, EntityId(id), created_at, likes)
                .await
                .unwrap();
        }
        let list = RankingList::windowed(Metric::Likes, TimeWindow::Day);

        let first = rankings.read_page_by_cursor(list, None, 3).await.unwrap();
        assert_eq!(first.ids(), vec![EntityId(2), EntityId(3), EntityId(5)]);
        assert!(first.has_next);

        let second = rankings.read_page_by_cursor(list, Some(EntityId(5)), 3).await.unwrap();
        assert_eq!(second.ids(), vec![EntityId(1), EntityId(4)]);
        assert!(!second.has_next);
    }

    #[tokio::test]
    async fn test_window_cap_evicts_lowest() {
        let h = Harness::new();
        let rankings = h.rankings();
        let created_at = Utc::now();
        let cap = rankings.config().window_cap;

        for id in 0..(cap as u64 + 10) {
            rankings
                .add_to_windowed_list(Metric::Views, TimeWindow::Month, EntityId(id), created_at, id as f64)
                .await
                .unwrap();
        }
        let list = RankingList::windowed(Metric::Views, TimeWindow::Month);

        assert_eq!(rankings.len(list).await.unwrap(), cap);
        // anchor trimmed away
        let page = rankings.read_page_by_cursor(list, Some(EntityId(0)), 10).await.unwrap();
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn test_global_list_orders_by_recency() {
        let h = Harness::new();
        let rankings = h.rankings();
        let base = Utc::now().timestamp_millis() as f64;

        rankings.add_to_global_list(EntityId(1), base, 1000).await.unwrap();
        rankings.add_to_global_list(EntityId(2), base + 1000.0, 1000).await.unwrap();

        let top = rankings.read_page(RankingList::Global, 0, 10).await.unwrap();
        assert_eq!(top[0].id, EntityId(2));
        assert_eq!(top[1].id, EntityId(1));
    }
}

// =============================================================================
// Feature 3: Snapshots
// =============================================================================

mod snapshot_tests {
    use super::*;
    use statboard::{Snapshot, SnapshotCache};

    #[tokio::test]
    async fn test_put_bulk_with_older_timestamp_is_noop() {
        let h = Harness::new();
        let boards = SnapshotCache::new(h.client.clone(), "board");

        let current = Snapshot::new(EntityId(1), "current", 200);
        boards.put_bulk(&[current.clone()]).await.unwrap();

        let written = boards
            .put_bulk(&[Snapshot::new(EntityId(1), "older", 100)])
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(boards.get(EntityId(1)).await.unwrap(), Some(current));
    }

    #[tokio::test]
    async fn test_snapshot_and_ranking_in_one_batch() {
        let h = Harness::new();
        let boards = SnapshotCache::new(h.client.clone(), "board");
        let rankings = h.rankings();

        let mut pipe = statboard::Pipeline::new();
        boards.stage_put(&mut pipe, &Snapshot::new(EntityId(3), "body", 1));
        rankings.stage_add_to_global_list(&mut pipe, EntityId(3), 1.0, 1000);

        let before = h.cache.stats().batches;
        h.client.run(pipe).await.unwrap();

        assert_eq!(h.cache.stats().batches, before + 1);
        assert!(boards.get(EntityId(3)).await.unwrap().is_some());
        assert_eq!(rankings.len(statboard::RankingList::Global).await.unwrap(), 1);
    }
}

// =============================================================================
// Feature 4: Event Projection
// =============================================================================

mod projector_tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use statboard::{DomainEvent, Projection, RankingList, ReadModelProjector};

    #[tokio::test]
    async fn test_event_stream_builds_read_model() {
        let h = Harness::new();
        let counters = Arc::new(h.counters(3));
        let projector = ReadModelProjector::new(counters.clone(), h.rankings());
        let now = Utc::now();

        let events = vec![
            DomainEvent::board_created(1, 2, now, json!({"title": "a"}), 1),
            DomainEvent::board_viewed(1, now, 2),
            DomainEvent::board_liked(1, 50, now, 3),
            DomainEvent::board_updated(1, 2, now, json!({"title": "b"}), 4),
            DomainEvent::board_created(1, 2, now, json!({"title": "a"}), 1),
        ];
        let projections = projector.apply_all(&events).await.unwrap();
        assert_eq!(projections.last(), Some(&Projection::Stale));

        let board = projector.boards().get(EntityId(1)).await.unwrap().unwrap();
        assert_eq!(board.decode::<serde_json::Value>().unwrap()["title"], "b");

        let totals = counters.get_counters(EntityId(1), Some(UserId(50)), None, None).await.unwrap();
        assert_eq!((totals.view_count, totals.like_count, totals.user_liked), (1, 1, true));
        assert_eq!(
            projector.rankings().len(RankingList::category(2)).await.unwrap(),
            1
        );

        counters.flush().await;
        assert_eq!(h.durable.counts(EntityId(1)), BaseCounts::new(1, 1));
    }

    #[tokio::test]
    async fn test_recency_cursor_pages_do_not_repeat() {
        let h = Harness::new();
        let counters = Arc::new(h.counters(3));
        let projector = ReadModelProjector::new(counters, h.rankings());
        let base = Utc::now();

        for id in 1..=7u64 {
            let created_at = base + chrono::Duration::milliseconds(id as i64);
            projector
                .apply(&DomainEvent::board_created(id, 2, created_at, json!({"n": id}), 1))
                .await
                .unwrap();
        }

        let rankings = projector.rankings();
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = rankings
                .read_page_by_cursor(RankingList::Global, cursor, 3)
                .await
                .unwrap();
            seen.extend(page.ids());
            if !page.has_next {
                break;
            }
            cursor = page.next_cursor();
        }
        assert_eq!(seen, (1..=7u64).rev().map(EntityId).collect::<Vec<_>>());

        let category = rankings
            .read_page_by_cursor(RankingList::category(2), Some(EntityId(4)), 10)
            .await
            .unwrap();
        assert_eq!(category.ids(), vec![EntityId(3), EntityId(2), EntityId(1)]);
    }

    #[tokio::test]
    async fn test_events_round_trip_through_json() {
        let event = DomainEvent::board_liked(1, 2, Utc::now(), 3);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"BoardLiked""#));
        assert_eq!(serde_json::from_str::<DomainEvent>(&json).unwrap(), event);
    }
}

// =============================================================================
// Feature 5: Configuration
// =============================================================================

mod config_tests {
    use statboard::EngineConfig;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str(
            r#"
counter:
  max_retry_count: 5
ranking:
  window_cap: 50
"#,
        )
        .unwrap();

        assert_eq!(config.counter.max_retry_count, 5);
        assert_eq!(config.counter.flush_interval_secs, 60);
        assert_eq!(config.ranking.window_cap, 50);
        assert_eq!(config.ranking.global_cap, 1000);
    }
}

// =============================================================================
// Property Tests
// =============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_view_delta_counts_every_increment(n in 1usize..50, id in any::<u64>()) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let h = Harness::new();
                let counters = h.counters(3);
                for _ in 0..n {
                    counters.increment_view(EntityId(id)).await.unwrap();
                }
                prop_assert_eq!(counters.view_delta(EntityId(id)).await.unwrap(), n as i64);
                prop_assert_eq!(counters.pending_ids().await.unwrap(), vec![id.to_string()]);
                Ok(())
            })?;
        }
    }
}
