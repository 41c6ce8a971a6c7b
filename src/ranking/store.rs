//! Bounded leaderboards over cache sorted sets.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::{decode_member, encode_member, take_reply, CacheClient, Pipeline};
use crate::config::RankingConfig;
use crate::domain::ports::EntityId;
use crate::error::Result;

use super::list::{Metric, RankingList, TimeWindow};
use super::page::{RankedEntry, RankingPage};

/// Gap below the anchor score a cursor page starts at.
pub const SCORE_EPSILON: f64 = 1e-6;

/// Time-windowed ranking store.
#[derive(Debug, Clone)]
pub struct RankingStore {
    cache: CacheClient,
    config: RankingConfig,
}

impl RankingStore {
    pub fn new(cache: CacheClient, config: RankingConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Upsert into the all-time list and trim it to `cap`.
    ///
    /// Returns false when the member already held `score`.
    pub async fn add_to_global_list(&self, id: EntityId, score: f64, cap: usize) -> Result<bool> {
        let mut pipe = Pipeline::new();
        let added = self.stage_add_to_global_list(&mut pipe, id, score, cap);
        self.run_insert(pipe, added).await
    }

    /// Upsert into a category list, trimmed to the configured category cap.
    pub async fn add_to_category_list(&self, category_id: u64, id: EntityId, score: f64) -> Result<bool> {
        let mut pipe = Pipeline::new();
        let added = self.stage_add_to_category_list(&mut pipe, category_id, id, score);
        self.run_insert(pipe, added).await
    }

    /// Upsert into a windowed list if the entity is young enough for the
    /// window, measured against the current time.
    pub async fn add_to_windowed_list(
        &self,
        metric: Metric,
        window: TimeWindow,
        id: EntityId,
        created_at: DateTime<Utc>,
        value: f64,
    ) -> Result<bool> {
        self.add_to_windowed_list_at(metric, window, id, created_at, value, Utc::now())
            .await
    }

    /// [`add_to_windowed_list`](Self::add_to_windowed_list) with an explicit clock.
    pub async fn add_to_windowed_list_at(
        &self,
        metric: Metric,
        window: TimeWindow,
        id: EntityId,
        created_at: DateTime<Utc>,
        value: f64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut pipe = Pipeline::new();
        match self.stage_add_to_windowed_list(&mut pipe, metric, window, id, created_at, value, now) {
            Some(added) => self.run_insert(pipe, added).await,
            None => {
                debug!(entity_id = %id, %window, "Outside window horizon, not ranked");
                Ok(false)
            }
        }
    }

    /// Write `value` into every window of `metric` that admits the entity, in
    /// one batch. Returns how many windows took the entry.
    pub async fn add_to_all_windows(
        &self,
        metric: Metric,
        id: EntityId,
        created_at: DateTime<Utc>,
        value: f64,
    ) -> Result<usize> {
        let now = Utc::now();
        let mut pipe = Pipeline::new();
        let staged = TimeWindow::ALL
            .iter()
            .filter_map(|window| self.stage_add_to_windowed_list(&mut pipe, metric, *window, id, created_at, value, now))
            .count();
        self.cache.run(pipe).await?;
        Ok(staged)
    }

    async fn run_insert(&self, pipe: Pipeline, added: usize) -> Result<bool> {
        let mut replies = self.cache.run(pipe).await?;
        take_reply(&mut replies, added).into_bool()
    }

    // =========================================================================
    // Staged inserts
    // =========================================================================

    /// Stage an insert plus trim; returns the reply index of the insert.
    pub fn stage_add_to_global_list(&self, pipe: &mut Pipeline, id: EntityId, score: f64, cap: usize) -> usize {
        stage_insert(pipe, RankingList::Global, id, score, cap)
    }

    pub fn stage_add_to_category_list(&self, pipe: &mut Pipeline, category_id: u64, id: EntityId, score: f64) -> usize {
        let list = RankingList::category(category_id);
        stage_insert(pipe, list, id, score, list.cap(&self.config))
    }

    /// Stage a windowed insert. Stages nothing and returns `None` when the
    /// entity is older than the window horizon at `now`.
    #[allow(clippy::too_many_arguments)]
    pub fn stage_add_to_windowed_list(
        &self,
        pipe: &mut Pipeline,
        metric: Metric,
        window: TimeWindow,
        id: EntityId,
        created_at: DateTime<Utc>,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<usize> {
        if !window.admits(now - created_at) {
            return None;
        }
        let list = RankingList::windowed(metric, window);
        Some(stage_insert(pipe, list, id, value, list.cap(&self.config)))
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove an entity from the global list and every windowed list.
    pub async fn remove(&self, id: EntityId) -> Result<()> {
        let mut pipe = Pipeline::new();
        pipe.zrem(RankingList::Global.key(), encode_member(id));
        stage_remove_windowed(&mut pipe, id);
        self.cache.run(pipe).await?;
        Ok(())
    }

    pub async fn remove_from_category(&self, category_id: u64, id: EntityId) -> Result<()> {
        self.cache
            .zrem(&RankingList::category(category_id).key(), &encode_member(id))
            .await?;
        Ok(())
    }

    pub async fn remove_from_windowed_lists(&self, id: EntityId) -> Result<()> {
        let mut pipe = Pipeline::new();
        stage_remove_windowed(&mut pipe, id);
        self.cache.run(pipe).await?;
        Ok(())
    }

    /// Stage removal from the global, category and windowed lists.
    pub fn stage_remove_everywhere(&self, pipe: &mut Pipeline, id: EntityId, category_id: Option<u64>) {
        pipe.zrem(RankingList::Global.key(), encode_member(id));
        if let Some(category_id) = category_id {
            pipe.zrem(RankingList::category(category_id).key(), encode_member(id));
        }
        stage_remove_windowed(pipe, id);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// `limit` entries from `offset`, highest score first.
    pub async fn read_page(&self, list: RankingList, offset: usize, limit: usize) -> Result<Vec<RankedEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let scored = self.cache.zrevrange(&list.key(), offset, limit).await?;
        Ok(decode_entries(scored))
    }

    /// Cursor page strictly below the score of `last_id`.
    ///
    /// A cursor whose anchor has left the list (trimmed or removed) yields an
    /// empty page.
    pub async fn read_page_by_cursor(
        &self,
        list: RankingList,
        last_id: Option<EntityId>,
        limit: usize,
    ) -> Result<RankingPage> {
        if limit == 0 {
            return Ok(RankingPage::empty());
        }
        let key = list.key();

        let scored = match last_id {
            None => self.cache.zrevrange(&key, 0, limit + 1).await?,
            Some(anchor) => {
                let Some(anchor_score) = self.cache.zscore(&key, &encode_member(anchor)).await? else {
                    debug!(list = %key, cursor = %anchor, "Cursor anchor evicted, returning empty page");
                    return Ok(RankingPage::empty());
                };
                self.cache
                    .zrevrange_by_score(&key, score_below(anchor_score), f64::NEG_INFINITY, 0, limit + 1)
                    .await?
            }
        };

        let mut entries = decode_entries(scored);
        let has_next = entries.len() > limit;
        entries.truncate(limit);
        Ok(RankingPage { entries, has_next })
    }

    /// Current score of an entity in a list.
    pub async fn score(&self, list: RankingList, id: EntityId) -> Result<Option<f64>> {
        self.cache.zscore(&list.key(), &encode_member(id)).await
    }

    /// Number of entries in a list.
    pub async fn len(&self, list: RankingList) -> Result<usize> {
        let count = self.cache.zcard(&list.key()).await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Inclusive upper bound for scores strictly below `anchor`.
///
/// Large scores (epoch millis) absorb the epsilon, so fall back to the next
/// representable value below the anchor.
fn score_below(anchor: f64) -> f64 {
    let bound = anchor - SCORE_EPSILON;
    if bound < anchor || !anchor.is_finite() {
        return bound;
    }
    if anchor == 0.0 {
        return -f64::from_bits(1);
    }
    let bits = anchor.to_bits();
    if anchor > 0.0 {
        f64::from_bits(bits - 1)
    } else {
        f64::from_bits(bits + 1)
    }
}

fn stage_insert(pipe: &mut Pipeline, list: RankingList, id: EntityId, score: f64, cap: usize) -> usize {
    let key = list.key();
    let added = pipe.zadd(key.clone(), encode_member(id), score);
    pipe.ztrim(key, cap);
    added
}

fn stage_remove_windowed(pipe: &mut Pipeline, id: EntityId) {
    for list in RankingList::all_windowed() {
        pipe.zrem(list.key(), encode_member(id));
    }
}

fn decode_entries(scored: Vec<(String, f64)>) -> Vec<RankedEntry> {
    scored
        .into_iter()
        .filter_map(|(member, score)| match decode_member(&member) {
            Some(id) => Some(RankedEntry { id, score }),
            None => {
                warn!(member = %member, "Skipping undecodable ranking member");
                None
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
