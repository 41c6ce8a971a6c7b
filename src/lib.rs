//! Statboard - Read-Model Materialization and Counter Reconciliation Engine
//!
//! Write-behind counters, bounded leaderboards and idempotent snapshots for a
//! community backend, kept in an external cache store in front of a durable
//! store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       ReadModelProjector                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Counter    │    │   Ranking    │    │   Snapshot   │       │
//! │  │    Store     │    │    Store     │    │    Cache     │       │
//! │  └──────┬───────┘    └──────┬───────┘    └──────┬───────┘       │
//! │         │      FlushScheduler (periodic)        │               │
//! │         ▼                   ▼                   ▼               │
//! │  ┌───────────────────────────────────────────────────────┐      │
//! │  │           CacheClient → dyn CacheStore                │      │
//! │  └───────────────────────────────────────────────────────┘      │
//! │         │ flush                                                 │
//! │         ▼                                                       │
//! │  dyn DurableCounterStore (apply_delta / fetch_base_counts)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Durable-store adapters implementing domain ports
//! - [`cache`] - Cache store port, commands, pipelines and in-memory backend
//! - [`config`] - Engine configuration
//! - [`counter`] - Write-behind counters and flush/reconciliation
//! - [`domain`] - Domain layer with ports and events
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus metrics
//! - [`projector`] - Routes domain events into the stores
//! - [`ranking`] - Time-windowed ranking store
//! - [`snapshot`] - Idempotent snapshot cache

pub mod adapters;
pub mod cache;
pub mod config;
pub mod counter;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod projector;
pub mod ranking;
pub mod snapshot;

// Re-export commonly used types
pub use cache::{CacheClient, CacheStore, InMemoryCacheStore, Pipeline};
pub use config::{CounterConfig, EngineConfig, RankingConfig};
pub use counter::{CounterBaseline, CounterStore, Counters, FlushReport, FlushScheduler};
pub use domain::{BaseCounts, DomainEvent, DurableCounterStore, EntityId, UserId};
pub use error::{Error, Result};
pub use projector::{Projection, ReadModelProjector};
pub use ranking::{Metric, RankedEntry, RankingList, RankingPage, RankingStore, TimeWindow};
pub use snapshot::{Snapshot, SnapshotCache};
