//! Cache store port and typed client.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::command::{Command, Pipeline, Reply};
use crate::error::{Error, Result};

/// External sorted-map / key-value store used as write-behind buffer and
/// leaderboard index.
///
/// Implementations must execute one `exec` batch atomically with respect to
/// other batches and return exactly one reply per command, in order.
/// Transport failures surface as [`Error::CacheUnavailable`] and must leave
/// the keyspace untouched.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Execute a batch of commands in one round trip.
    async fn exec(&self, commands: Vec<Command>) -> Result<Vec<Reply>>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Thin typed wrapper over a [`CacheStore`].
///
/// Every method maps to exactly one command; batches go through
/// [`run`](Self::run).
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient").finish_non_exhaustive()
    }
}

impl CacheClient {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Execute a pipeline. An empty pipeline never reaches the store.
    pub async fn run(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        if pipeline.is_empty() {
            return Ok(Vec::new());
        }

        let expected = pipeline.len();
        let replies = self.store.exec(pipeline.into_commands()).await?;
        if replies.len() != expected {
            return Err(Error::CacheStore(format!(
                "expected {} replies, got {}",
                expected,
                replies.len()
            )));
        }
        Ok(replies)
    }

    async fn single(&self, command: Command) -> Result<Reply> {
        let mut pipeline = Pipeline::new();
        pipeline.push(command);
        self.run(pipeline)
            .await?
            .pop()
            .ok_or_else(|| Error::CacheStore("empty reply".into()))
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.single(Command::IncrBy {
            key: key.to_string(),
            delta,
        })
        .await?
        .into_i64()
    }

    pub async fn get_i64(&self, key: &str) -> Result<i64> {
        self.single(Command::Get {
            key: key.to_string(),
        })
        .await?
        .into_i64()
    }

    pub async fn get_del_i64(&self, key: &str) -> Result<i64> {
        self.single(Command::GetDel {
            key: key.to_string(),
        })
        .await?
        .into_i64()
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>> {
        self.single(Command::Get {
            key: key.to_string(),
        })
        .await?
        .into_bytes()
    }

    pub async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.single(Command::Set {
            key: key.to_string(),
            value,
        })
        .await
        .map(|_| ())
    }

    pub async fn del(&self, key: &str) -> Result<bool> {
        self.single(Command::Del {
            key: key.to_string(),
        })
        .await?
        .into_bool()
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.single(Command::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_bool()
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.single(Command::SRem {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_bool()
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.single(Command::SIsMember {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_bool()
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.single(Command::SMembers {
            key: key.to_string(),
        })
        .await?
        .into_members()
    }

    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        self.single(Command::ZAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        })
        .await?
        .into_bool()
    }

    pub async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.single(Command::ZScore {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_score()
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        self.single(Command::ZRem {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_bool()
    }

    pub async fn zrevrange(&self, key: &str, offset: usize, count: usize) -> Result<Vec<(String, f64)>> {
        self.single(Command::ZRevRange {
            key: key.to_string(),
            offset,
            count,
        })
        .await?
        .into_scored()
    }

    pub async fn zrevrange_by_score(
        &self,
        key: &str,
        max: f64,
        min: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, f64)>> {
        self.single(Command::ZRevRangeByScore {
            key: key.to_string(),
            max,
            min,
            offset,
            count,
        })
        .await?
        .into_scored()
    }

    pub async fn zcard(&self, key: &str) -> Result<i64> {
        self.single(Command::ZCard {
            key: key.to_string(),
        })
        .await?
        .into_i64()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;

    fn client() -> (Arc<InMemoryCacheStore>, CacheClient) {
        let store = Arc::new(InMemoryCacheStore::new());
        (store.clone(), CacheClient::new(store))
    }

    #[tokio::test]
    async fn test_empty_pipeline_skips_store() {
        let (store, client) = client();
        let replies = client.run(Pipeline::new()).await.unwrap();
        assert!(replies.is_empty());
        assert_eq!(store.stats().batches, 0);
    }

    #[tokio::test]
    async fn test_typed_counter_ops() {
        let (_, client) = client();
        assert_eq!(client.incr_by("n", 2).await.unwrap(), 2);
        assert_eq!(client.incr_by("n", -5).await.unwrap(), -3);
        assert_eq!(client.get_i64("n").await.unwrap(), -3);
        assert_eq!(client.get_del_i64("n").await.unwrap(), -3);
        assert_eq!(client.get_i64("n").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_typed_set_ops() {
        let (_, client) = client();
        assert!(client.sadd("s", "a").await.unwrap());
        assert!(!client.sadd("s", "a").await.unwrap());
        assert!(client.sismember("s", "a").await.unwrap());
        assert_eq!(client.smembers("s").await.unwrap(), vec!["a".to_string()]);
        assert!(client.srem("s", "a").await.unwrap());
        assert!(!client.srem("s", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_ping_reports_offline_store() {
        let (store, client) = client();
        client.ping().await.unwrap();
        store.set_offline(true);
        assert!(client.ping().await.unwrap_err().is_transport());
    }
}
