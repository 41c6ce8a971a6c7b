//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! Value objects shared by every store, plus the port through which the
//! engine reaches the durable store. The cache store port lives with its
//! adapter in [`crate::cache`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │        DurableCounterStore │ CacheStore             │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │   InMemoryDurableStore │ InMemoryCacheStore         │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Entity identifier (boards, comments, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| Error::InvalidOperation(format!("invalid entity id '{}': {}", s, e)))
    }
}

/// User identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Baseline counts held by the durable store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseCounts {
    pub view: i64,
    pub like: i64,
}

impl BaseCounts {
    pub fn new(view: i64, like: i64) -> Self {
        Self { view, like }
    }
}

// =============================================================================
// Durable Store Port
// =============================================================================

/// Port for the authoritative store holding baseline counts.
///
/// The engine only ever talks to the durable store through these two calls:
/// reconciliation pushes deltas with [`apply_delta`](Self::apply_delta), and
/// read paths opportunistically fetch baselines they were not handed.
#[async_trait]
pub trait DurableCounterStore: Send + Sync {
    /// Add the given deltas to the entity's persisted counts.
    ///
    /// Returns `Ok(true)` once persisted, `Ok(false)` when the store declined
    /// (e.g. the entity no longer exists).
    async fn apply_delta(&self, id: EntityId, view_delta: i64, like_delta: i64) -> Result<bool>;

    /// Fetch the persisted counts for an entity.
    async fn fetch_base_counts(&self, id: EntityId) -> Result<BaseCounts>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_parse() {
        let id: EntityId = "42".parse().unwrap();
        assert_eq!(id, EntityId(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_entity_id_parse_rejects_garbage() {
        assert!("board-1".parse::<EntityId>().is_err());
        assert!("-3".parse::<EntityId>().is_err());
        assert!("".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_base_counts_default() {
        assert_eq!(BaseCounts::default(), BaseCounts::new(0, 0));
    }
}
