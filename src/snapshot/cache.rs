//! Watermark-guarded snapshot cache.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::{take_reply, CacheClient, CacheKey, Pipeline};
use crate::domain::ports::EntityId;
use crate::error::Result;
use crate::metrics;

use super::entry::Snapshot;

/// Idempotent snapshot cache for one entity kind.
///
/// Each entry is a payload key plus a state key holding the last applied
/// event timestamp. Writes and invalidations only take effect when their
/// timestamp is strictly newer than the state key.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    cache: CacheClient,
    namespace: String,
}

impl SnapshotCache {
    pub fn new(cache: CacheClient, namespace: impl Into<String>) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get(&self, id: EntityId) -> Result<Option<Snapshot>> {
        let mut found = self.get_bulk(&[id]).await?;
        Ok(found.remove(&id))
    }

    /// Fetch many snapshots in one round trip. Absent ids are omitted.
    pub async fn get_bulk(&self, ids: &[EntityId]) -> Result<HashMap<EntityId, Snapshot>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = Pipeline::new();
        let slots: Vec<(usize, usize)> = ids
            .iter()
            .map(|id| {
                (
                    pipe.get(CacheKey::snapshot(&self.namespace, *id)),
                    pipe.get(CacheKey::snapshot_state(&self.namespace, *id)),
                )
            })
            .collect();

        let mut replies = self.cache.run(pipe).await?;
        let mut found = HashMap::with_capacity(ids.len());
        for (id, (payload, state)) in ids.iter().zip(slots) {
            let Some(payload) = take_reply(&mut replies, payload).into_bytes()? else {
                continue;
            };
            let event_timestamp = take_reply(&mut replies, state).into_i64()?;
            found.insert(*id, Snapshot::new(*id, payload, event_timestamp));
        }
        Ok(found)
    }

    /// Write a snapshot if its timestamp is newer than the stored one.
    ///
    /// Returns false when the write was suppressed; that is not an error.
    pub async fn put(&self, snapshot: &Snapshot) -> Result<bool> {
        Ok(self.put_bulk(std::slice::from_ref(snapshot)).await? == 1)
    }

    /// Write many snapshots in one batch, each under its own watermark check.
    /// Returns how many were written.
    pub async fn put_bulk(&self, snapshots: &[Snapshot]) -> Result<usize> {
        let mut pipe = Pipeline::new();
        let slots: Vec<usize> = snapshots.iter().map(|s| self.stage_put(&mut pipe, s)).collect();

        let mut replies = self.cache.run(pipe).await?;
        let mut written = 0;
        for slot in slots {
            if take_reply(&mut replies, slot).into_bool()? {
                written += 1;
            }
        }

        let suppressed = snapshots.len() - written;
        metrics::record_snapshot_writes(written as u64, suppressed as u64);
        if suppressed > 0 {
            debug!(
                namespace = %self.namespace,
                written,
                suppressed,
                "Suppressed stale snapshot writes"
            );
        }
        Ok(written)
    }

    /// Stage a guarded write; the reply at the returned index is 1 when written.
    pub fn stage_put(&self, pipe: &mut Pipeline, snapshot: &Snapshot) -> usize {
        pipe.set_if_newer(
            CacheKey::snapshot(&self.namespace, snapshot.id),
            snapshot.payload.clone(),
            CacheKey::snapshot_state(&self.namespace, snapshot.id),
            snapshot.event_timestamp,
        )
    }

    /// Drop the payload for a deleted entity. The watermark advances to
    /// `event_timestamp` and stays behind, so older writes arriving late
    /// remain suppressed.
    pub async fn invalidate(&self, id: EntityId, event_timestamp: i64) -> Result<bool> {
        let mut pipe = Pipeline::new();
        let slot = self.stage_invalidate(&mut pipe, id, event_timestamp);
        let mut replies = self.cache.run(pipe).await?;
        take_reply(&mut replies, slot).into_bool()
    }

    pub fn stage_invalidate(&self, pipe: &mut Pipeline, id: EntityId, event_timestamp: i64) -> usize {
        pipe.del_if_newer(
            CacheKey::snapshot(&self.namespace, id),
            CacheKey::snapshot_state(&self.namespace, id),
            event_timestamp,
        )
    }

    /// Remove payload and watermark unconditionally.
    pub async fn purge(&self, id: EntityId) -> Result<()> {
        let mut pipe = Pipeline::new();
        pipe.del(CacheKey::snapshot(&self.namespace, id));
        pipe.del(CacheKey::snapshot_state(&self.namespace, id));
        self.cache.run(pipe).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::cache::InMemoryCacheStore;

    fn boards() -> (Arc<InMemoryCacheStore>, SnapshotCache) {
        let cache = Arc::new(InMemoryCacheStore::new());
        (cache.clone(), SnapshotCache::new(CacheClient::new(cache), "board"))
    }

    fn snap(id: u64, body: &'static str, ts: i64) -> Snapshot {
        Snapshot::new(EntityId(id), Bytes::from_static(body.as_bytes()), ts)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_, cache) = boards();
        assert!(cache.put(&snap(1, "v1", 100)).await.unwrap());

        let stored = cache.get(EntityId(1)).await.unwrap().unwrap();
        assert_eq!(stored, snap(1, "v1", 100));
        assert_eq!(cache.get(EntityId(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_and_tied_writes_are_suppressed() {
        let (_, cache) = boards();
        cache.put(&snap(1, "v100", 100)).await.unwrap();

        assert!(!cache.put(&snap(1, "tie", 100)).await.unwrap());
        assert!(!cache.put(&snap(1, "old", 99)).await.unwrap());
        assert_eq!(cache.get(EntityId(1)).await.unwrap().unwrap().payload, "v100");

        assert!(cache.put(&snap(1, "v101", 101)).await.unwrap());
        assert_eq!(cache.get(EntityId(1)).await.unwrap().unwrap().event_timestamp, 101);
    }

    #[tokio::test]
    async fn test_put_bulk_older_timestamp_is_noop() {
        let (cache_store, cache) = boards();
        assert_eq!(
            cache.put_bulk(&[snap(1, "a", 50), snap(2, "b", 50)]).await.unwrap(),
            2
        );

        let written = cache.put_bulk(&[snap(1, "a-old", 40), snap(2, "b-new", 60)]).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(cache_store.stats().batches, 2);
        let found = cache.get_bulk(&[EntityId(1), EntityId(2)]).await.unwrap();
        assert_eq!(found[&EntityId(1)], snap(1, "a", 50));
        assert_eq!(found[&EntityId(2)], snap(2, "b-new", 60));
    }

    #[tokio::test]
    async fn test_get_bulk_omits_absent() {
        let (cache_store, cache) = boards();
        cache.put(&snap(3, "c", 1)).await.unwrap();

        let found = cache.get_bulk(&[EntityId(1), EntityId(3)]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&EntityId(3)));

        let before = cache_store.stats().batches;
        assert!(cache.get_bulk(&[]).await.unwrap().is_empty());
        assert_eq!(cache_store.stats().batches, before);
    }

    #[tokio::test]
    async fn test_invalidate_leaves_tombstone() {
        let (_, cache) = boards();
        cache.put(&snap(1, "v", 10)).await.unwrap();

        assert!(cache.invalidate(EntityId(1), 20).await.unwrap());
        assert_eq!(cache.get(EntityId(1)).await.unwrap(), None);

        // a late update from before the delete stays out
        assert!(!cache.put(&snap(1, "late", 15)).await.unwrap());
        assert_eq!(cache.get(EntityId(1)).await.unwrap(), None);
        assert!(!cache.invalidate(EntityId(1), 20).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_forgets_watermark() {
        let (cache_store, cache) = boards();
        cache.put(&snap(1, "v", 10)).await.unwrap();
        cache.purge(EntityId(1)).await.unwrap();

        assert_eq!(cache_store.key_count(), 0);
        assert!(cache.put(&snap(1, "again", 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let (cache_store, boards) = boards();
        let comments = SnapshotCache::new(CacheClient::new(cache_store), "comment");

        boards.put(&snap(1, "board", 5)).await.unwrap();
        assert_eq!(comments.get(EntityId(1)).await.unwrap(), None);
        assert!(comments.put(&snap(1, "comment", 1)).await.unwrap());
    }
}
