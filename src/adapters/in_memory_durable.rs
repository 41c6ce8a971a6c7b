//! In-memory durable store adapter.
//!
//! Implements the `DurableCounterStore` port over a `DashMap`. Used by tests
//! and by the daemon's standalone mode. Rejections and lookup failures can be
//! scripted to exercise the reconciliation paths.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::ports::{BaseCounts, DurableCounterStore, EntityId};
use crate::error::{Error, Result};

/// Durable store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    counts: DashMap<EntityId, BaseCounts>,
    /// Scripted `apply_delta` answers, consumed front to back; empty = accept
    scripted_applies: Mutex<Vec<bool>>,
    /// When set, `fetch_base_counts` fails
    lookups_failing: AtomicBool,
    apply_calls: AtomicU64,
    lookup_calls: AtomicU64,
}

impl InMemoryDurableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed baseline counts for an entity.
    pub fn seed(&self, id: EntityId, counts: BaseCounts) {
        self.counts.insert(id, counts);
    }

    /// Current persisted counts (zero when unknown).
    pub fn counts(&self, id: EntityId) -> BaseCounts {
        self.counts.get(&id).map(|c| *c).unwrap_or_default()
    }

    /// Answer the next `apply_delta` calls with the given results, in order.
    pub fn script_applies(&self, results: impl IntoIterator<Item = bool>) {
        self.scripted_applies.lock().extend(results);
    }

    /// Make base-count lookups fail (or succeed again).
    pub fn set_lookups_failing(&self, failing: bool) {
        self.lookups_failing.store(failing, Ordering::Relaxed);
    }

    /// Number of `apply_delta` calls received
    pub fn apply_calls(&self) -> u64 {
        self.apply_calls.load(Ordering::Relaxed)
    }

    /// Number of `fetch_base_counts` calls received
    pub fn lookup_calls(&self) -> u64 {
        self.lookup_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DurableCounterStore for InMemoryDurableStore {
    async fn apply_delta(&self, id: EntityId, view_delta: i64, like_delta: i64) -> Result<bool> {
        self.apply_calls.fetch_add(1, Ordering::Relaxed);

        let accepted = {
            let mut scripted = self.scripted_applies.lock();
            if scripted.is_empty() {
                true
            } else {
                scripted.remove(0)
            }
        };
        if !accepted {
            debug!(entity_id = %id, "Durable store rejected delta");
            return Ok(false);
        }

        let mut entry = self.counts.entry(id).or_default();
        entry.view += view_delta;
        entry.like += like_delta;
        Ok(true)
    }

    async fn fetch_base_counts(&self, id: EntityId) -> Result<BaseCounts> {
        self.lookup_calls.fetch_add(1, Ordering::Relaxed);

        if self.lookups_failing.load(Ordering::Relaxed) {
            return Err(Error::DurableStore(format!("lookup failed for entity {}", id)));
        }
        Ok(self.counts(id))
    }
}
