//! Cache Store Adapter
//!
//! Thin layer over the external key-value / sorted-set store that fronts the
//! durable store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │   CounterStore        RankingStore        SnapshotCache              │
//! │        │                   │                    │                    │
//! │        └───────────────────┼────────────────────┘                    │
//! │                            ▼                                         │
//! │                  CacheClient  (typed ops + Pipeline)                 │
//! │                            │                                         │
//! │                            ▼                                         │
//! │                  dyn CacheStore  (exec batch, ping)                  │
//! │                            │                                         │
//! │             InMemoryCacheStore │ any remote adapter                  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - Every mutation is an atomic primitive of the store (increment,
//!   get-and-delete, set add/remove, conditional set); no read-modify-write
//!   in application code
//! - A pipeline is one round trip and one atomic unit
//! - Transport errors are returned unchanged; nothing retries here

mod command;
mod memory;
mod store;
pub mod keys;

pub use command::{take_reply, Command, Pipeline, Reply};
pub use keys::{decode_member, encode_member, CacheKey};
pub use memory::{CacheStoreStats, InMemoryCacheStore};
pub use store::{CacheClient, CacheStore};
