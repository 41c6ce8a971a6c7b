//! Write-behind counter store.
//!
//! View and like increments land in the cache store as deltas against the
//! durable baseline. Reads sum the baseline with the outstanding delta; the
//! flush cycle (see `flush.rs`) drains deltas into the durable store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{take_reply, CacheClient, CacheKey, Pipeline};
use crate::config::CounterConfig;
use crate::domain::ports::{BaseCounts, DurableCounterStore, EntityId, UserId};
use crate::error::{Error, Result};

use super::stats::FlushStats;

/// Counter totals as presented to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub view_count: i64,
    pub like_count: i64,
    /// Whether the requesting user has an unreconciled like
    pub user_liked: bool,
}

impl Counters {
    /// Build totals from a baseline and outstanding deltas, clamped at zero.
    pub fn from_parts(base: BaseCounts, view_delta: i64, like_delta: i64, user_liked: bool) -> Self {
        Self {
            view_count: (base.view + view_delta).max(0),
            like_count: (base.like + like_delta).max(0),
            user_liked,
        }
    }
}

/// Durable baseline supplied by the caller for a bulk read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterBaseline {
    pub id: EntityId,
    pub view: i64,
    pub like: i64,
}

impl CounterBaseline {
    pub fn new(id: EntityId, view: i64, like: i64) -> Self {
        Self { id, view, like }
    }
}

/// Counter aggregation store.
pub struct CounterStore {
    pub(super) cache: CacheClient,
    pub(super) durable: Arc<dyn DurableCounterStore>,
    pub(super) config: CounterConfig,
    pub(super) stats: Arc<FlushStats>,
}

impl CounterStore {
    pub fn new(cache: CacheClient, durable: Arc<dyn DurableCounterStore>, config: CounterConfig) -> Self {
        Self {
            cache,
            durable,
            config,
            stats: Arc::new(FlushStats::default()),
        }
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    /// Cumulative flush statistics.
    pub fn stats(&self) -> &Arc<FlushStats> {
        &self.stats
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Count one view. Bumps the view delta and marks the entity pending in
    /// a single batch.
    pub async fn increment_view(&self, id: EntityId) -> Result<()> {
        let mut pipe = Pipeline::new();
        pipe.incr_by(CacheKey::view_delta(id), 1);
        pipe.sadd(CacheKey::pending(), id.to_string());
        self.cache.run(pipe).await?;

        debug!(entity_id = %id, "Recorded view");
        Ok(())
    }

    /// Record a like by `user` and return the entity's new like total.
    ///
    /// Fails with [`Error::InvalidOperation`] when the user already has an
    /// unreconciled like; the delta is left untouched in that case.
    pub async fn increment_like(
        &self,
        id: EntityId,
        user: UserId,
        db_like_hint: Option<i64>,
    ) -> Result<i64> {
        let members = CacheKey::like_members(id);
        let user_member = user.to_string();

        // SADD is the atomic check-and-mark
        if !self.cache.sadd(&members, &user_member).await? {
            return Err(Error::InvalidOperation(format!(
                "already liked: user {} on entity {}",
                user, id
            )));
        }

        let delta = match self.apply_like_delta(id, 1).await {
            Ok(delta) => delta,
            Err(e) => {
                self.restore_membership(&members, &user_member, false).await;
                return Err(e);
            }
        };

        let base = self.like_base(id, db_like_hint).await;
        debug!(entity_id = %id, user_id = %user, delta, "Recorded like");
        Ok((base + delta).max(0))
    }

    /// Withdraw a like by `user` and return the entity's new like total.
    ///
    /// Fails with [`Error::InvalidOperation`] when the user has no
    /// unreconciled like.
    pub async fn decrement_like(
        &self,
        id: EntityId,
        user: UserId,
        db_like_hint: Option<i64>,
    ) -> Result<i64> {
        let members = CacheKey::like_members(id);
        let user_member = user.to_string();

        if !self.cache.srem(&members, &user_member).await? {
            return Err(Error::InvalidOperation(format!(
                "not liked: user {} on entity {}",
                user, id
            )));
        }

        let delta = match self.apply_like_delta(id, -1).await {
            Ok(delta) => delta,
            Err(e) => {
                self.restore_membership(&members, &user_member, true).await;
                return Err(e);
            }
        };

        let base = self.like_base(id, db_like_hint).await;
        debug!(entity_id = %id, user_id = %user, delta, "Withdrew like");
        Ok((base + delta).max(0))
    }

    async fn apply_like_delta(&self, id: EntityId, delta: i64) -> Result<i64> {
        let mut pipe = Pipeline::new();
        let incr = pipe.incr_by(CacheKey::like_delta(id), delta);
        pipe.sadd(CacheKey::pending(), id.to_string());
        let mut replies = self.cache.run(pipe).await?;
        take_reply(&mut replies, incr).into_i64()
    }

    /// Undo a membership change whose delta write failed.
    async fn restore_membership(&self, key: &str, member: &str, present: bool) {
        let restored = if present {
            self.cache.sadd(key, member).await
        } else {
            self.cache.srem(key, member).await
        };
        if let Err(e) = restored {
            warn!(key, member, error = %e, "Failed to restore like membership");
        }
    }

    /// Drop every counter key for a deleted entity and unmark it pending.
    pub async fn cleanup(&self, id: EntityId) -> Result<()> {
        let mut pipe = Pipeline::new();
        self.stage_cleanup(&mut pipe, id);
        self.cache.run(pipe).await?;

        debug!(entity_id = %id, "Cleaned up counter state");
        Ok(())
    }

    /// Stage the deletes of [`cleanup`](Self::cleanup) into an open pipeline.
    pub fn stage_cleanup(&self, pipe: &mut Pipeline, id: EntityId) {
        pipe.del(CacheKey::view_delta(id));
        pipe.del(CacheKey::like_delta(id));
        pipe.del(CacheKey::like_members(id));
        pipe.del(CacheKey::failures(id));
        pipe.srem(CacheKey::pending(), id.to_string());
    }

    /// Clear the reconciliation failure counter so a skipped entity is
    /// retried on its next flush.
    pub async fn reset_failures(&self, id: EntityId) -> Result<()> {
        self.cache.del(&CacheKey::failures(id)).await?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current totals for one entity.
    ///
    /// Missing hints are filled from the durable store; a failed lookup
    /// reads as zero.
    pub async fn get_counters(
        &self,
        id: EntityId,
        user: Option<UserId>,
        db_view_hint: Option<i64>,
        db_like_hint: Option<i64>,
    ) -> Result<Counters> {
        let base = match (db_view_hint, db_like_hint) {
            (Some(view), Some(like)) => BaseCounts::new(view, like),
            (view, like) => {
                let fetched = self.fetch_base(id).await;
                BaseCounts::new(view.unwrap_or(fetched.view), like.unwrap_or(fetched.like))
            }
        };

        let mut pipe = Pipeline::new();
        let view = pipe.get(CacheKey::view_delta(id));
        let like = pipe.get(CacheKey::like_delta(id));
        let liked = user.map(|u| pipe.sismember(CacheKey::like_members(id), u.to_string()));

        let mut replies = self.cache.run(pipe).await?;
        let view_delta = take_reply(&mut replies, view).into_i64()?;
        let like_delta = take_reply(&mut replies, like).into_i64()?;
        let user_liked = match liked {
            Some(idx) => take_reply(&mut replies, idx).into_bool()?,
            None => false,
        };

        Ok(Counters::from_parts(base, view_delta, like_delta, user_liked))
    }

    /// Totals for many entities in one round trip, in input order.
    pub async fn get_bulk_counters(
        &self,
        entries: &[CounterBaseline],
        user: Option<UserId>,
    ) -> Result<Vec<Counters>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = Pipeline::new();
        let slots: Vec<(usize, usize, Option<usize>)> = entries
            .iter()
            .map(|entry| {
                let view = pipe.get(CacheKey::view_delta(entry.id));
                let like = pipe.get(CacheKey::like_delta(entry.id));
                let liked = user.map(|u| pipe.sismember(CacheKey::like_members(entry.id), u.to_string()));
                (view, like, liked)
            })
            .collect();

        let mut replies = self.cache.run(pipe).await?;
        entries
            .iter()
            .zip(slots)
            .map(|(entry, (view, like, liked))| {
                let view_delta = take_reply(&mut replies, view).into_i64()?;
                let like_delta = take_reply(&mut replies, like).into_i64()?;
                let user_liked = match liked {
                    Some(idx) => take_reply(&mut replies, idx).into_bool()?,
                    None => false,
                };
                Ok(Counters::from_parts(
                    BaseCounts::new(entry.view, entry.like),
                    view_delta,
                    like_delta,
                    user_liked,
                ))
            })
            .collect()
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Raw pending-set members, unparsed.
    pub async fn pending_ids(&self) -> Result<Vec<String>> {
        self.cache.smembers(&CacheKey::pending()).await
    }

    pub async fn view_delta(&self, id: EntityId) -> Result<i64> {
        self.cache.get_i64(&CacheKey::view_delta(id)).await
    }

    pub async fn like_delta(&self, id: EntityId) -> Result<i64> {
        self.cache.get_i64(&CacheKey::like_delta(id)).await
    }

    /// Consecutive failed reconciliations recorded for an entity.
    pub async fn failure_count(&self, id: EntityId) -> Result<u32> {
        let count = self.cache.get_i64(&CacheKey::failures(id)).await?;
        Ok(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
    }

    pub async fn has_liked(&self, id: EntityId, user: UserId) -> Result<bool> {
        self.cache
            .sismember(&CacheKey::like_members(id), &user.to_string())
            .await
    }

    // =========================================================================
    // Durable baseline
    // =========================================================================

    async fn like_base(&self, id: EntityId, hint: Option<i64>) -> i64 {
        match hint {
            Some(like) => like,
            None => self.fetch_base(id).await.like,
        }
    }

    async fn fetch_base(&self, id: EntityId) -> BaseCounts {
        match self.durable.fetch_base_counts(id).await {
            Ok(base) => base,
            Err(e) => {
                warn!(entity_id = %id, error = %e, "Durable baseline lookup failed, using zero");
                BaseCounts::default()
            }
        }
    }
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
