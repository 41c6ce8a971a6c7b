//! Read-model projector.
//!
//! Applies write-path [`DomainEvent`]s to the counter store, the ranking
//! store and the snapshot caches.
//!
//! | Event | Effect |
//! |-------|--------|
//! | `BoardCreated` / `BoardUpdated` | board snapshot; recency lists if the snapshot was accepted |
//! | `BoardDeleted` | counter cleanup, ranking removal, snapshot tombstone (one batch) |
//! | `BoardViewed` | view increment; `views` windows refreshed with the new total |
//! | `BoardLiked` / `BoardUnliked` | like toggle; `likes` windows refreshed with the new total |
//! | `Comment*` | comment snapshot / tombstone |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::cache::{take_reply, Pipeline};
use crate::counter::CounterStore;
use crate::domain::events::DomainEvent;
use crate::domain::ports::{EntityId, UserId};
use crate::error::Result;
use crate::ranking::{Metric, RankingStore};
use crate::snapshot::{Snapshot, SnapshotCache};

/// Snapshot namespace for boards
pub const BOARD_NAMESPACE: &str = "board";

/// Snapshot namespace for comments
pub const COMMENT_NAMESPACE: &str = "comment";

/// What applying an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Applied,
    /// The event was at or below the entity's watermark and changed nothing
    Stale,
}

/// Routes domain events into the read-model stores.
#[derive(Debug)]
pub struct ReadModelProjector {
    counters: Arc<CounterStore>,
    rankings: RankingStore,
    boards: SnapshotCache,
    comments: SnapshotCache,
}

impl ReadModelProjector {
    pub fn new(counters: Arc<CounterStore>, rankings: RankingStore) -> Self {
        let cache = counters.cache().clone();
        Self {
            boards: SnapshotCache::new(cache.clone(), BOARD_NAMESPACE),
            comments: SnapshotCache::new(cache, COMMENT_NAMESPACE),
            counters,
            rankings,
        }
    }

    pub fn counters(&self) -> &Arc<CounterStore> {
        &self.counters
    }

    pub fn rankings(&self) -> &RankingStore {
        &self.rankings
    }

    pub fn boards(&self) -> &SnapshotCache {
        &self.boards
    }

    pub fn comments(&self) -> &SnapshotCache {
        &self.comments
    }

    /// Apply one event.
    ///
    /// Domain violations (double like, unlike without like) and cache
    /// transport failures are returned to the caller.
    #[instrument(skip(self, event), fields(event_type = event.event_type(), entity_id = %event.entity_id()))]
    pub async fn apply(&self, event: &DomainEvent) -> Result<Projection> {
        let projection = match event {
            DomainEvent::BoardCreated {
                board_id,
                category_id,
                created_at,
                payload,
                event_timestamp,
            }
            | DomainEvent::BoardUpdated {
                board_id,
                category_id,
                created_at,
                payload,
                event_timestamp,
            } => {
                let snapshot = Snapshot::from_json(*board_id, payload, *event_timestamp)?;
                self.upsert_board(&snapshot, *category_id, *created_at).await?
            }
            DomainEvent::BoardDeleted {
                board_id,
                category_id,
                event_timestamp,
            } => self.delete_board(*board_id, *category_id, *event_timestamp).await?,
            DomainEvent::BoardViewed {
                board_id, created_at, ..
            } => {
                self.counters.increment_view(*board_id).await?;
                let totals = self.counters.get_counters(*board_id, None, None, None).await?;
                self.rankings
                    .add_to_all_windows(Metric::Views, *board_id, *created_at, totals.view_count as f64)
                    .await?;
                Projection::Applied
            }
            DomainEvent::BoardLiked {
                board_id,
                user_id,
                created_at,
                ..
            } => self.toggle_like(*board_id, *user_id, *created_at, true).await?,
            DomainEvent::BoardUnliked {
                board_id,
                user_id,
                created_at,
                ..
            } => self.toggle_like(*board_id, *user_id, *created_at, false).await?,
            DomainEvent::CommentCreated {
                comment_id,
                payload,
                event_timestamp,
                ..
            }
            | DomainEvent::CommentUpdated {
                comment_id,
                payload,
                event_timestamp,
                ..
            } => {
                let snapshot = Snapshot::from_json(*comment_id, payload, *event_timestamp)?;
                applied_if(self.comments.put(&snapshot).await?)
            }
            DomainEvent::CommentDeleted {
                comment_id,
                event_timestamp,
                ..
            } => applied_if(self.comments.invalidate(*comment_id, *event_timestamp).await?),
        };

        debug!(?projection, "Projected event");
        Ok(projection)
    }

    /// Apply events in order, stopping at the first error.
    pub async fn apply_all<'a>(&self, events: impl IntoIterator<Item = &'a DomainEvent>) -> Result<Vec<Projection>> {
        let mut projections = Vec::new();
        for event in events {
            projections.push(self.apply(event).await?);
        }
        Ok(projections)
    }

    async fn upsert_board(
        &self,
        snapshot: &Snapshot,
        category_id: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Projection> {
        if !self.boards.put(snapshot).await? {
            return Ok(Projection::Stale);
        }

        let score = created_at.timestamp_millis() as f64;
        let global_cap = self.rankings.config().global_cap;
        let mut pipe = Pipeline::new();
        self.rankings
            .stage_add_to_global_list(&mut pipe, snapshot.id, score, global_cap);
        self.rankings
            .stage_add_to_category_list(&mut pipe, category_id, snapshot.id, score);
        self.counters.cache().run(pipe).await?;
        Ok(Projection::Applied)
    }

    async fn delete_board(&self, id: EntityId, category_id: u64, event_timestamp: i64) -> Result<Projection> {
        let mut pipe = Pipeline::new();
        let invalidated = self.boards.stage_invalidate(&mut pipe, id, event_timestamp);
        self.counters.stage_cleanup(&mut pipe, id);
        self.rankings.stage_remove_everywhere(&mut pipe, id, Some(category_id));

        let mut replies = self.counters.cache().run(pipe).await?;
        Ok(applied_if(take_reply(&mut replies, invalidated).into_bool()?))
    }

    async fn toggle_like(
        &self,
        id: EntityId,
        user: UserId,
        created_at: DateTime<Utc>,
        liked: bool,
    ) -> Result<Projection> {
        let total = if liked {
            self.counters.increment_like(id, user, None).await?
        } else {
            self.counters.decrement_like(id, user, None).await?
        };
        self.rankings
            .add_to_all_windows(Metric::Likes, id, created_at, total as f64)
            .await?;
        Ok(Projection::Applied)
    }
}

fn applied_if(applied: bool) -> Projection {
    if applied {
        Projection::Applied
    } else {
        Projection::Stale
    }
}

// =============================================================================
// Tests
// =============================================================================
