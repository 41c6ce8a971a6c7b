//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern. The cache store adapter lives in
//! [`crate::cache`]; this module holds the durable-store side.
//!
//! # Usage
//!
//! ```ignore
//! use statboard::adapters::InMemoryDurableStore;
//! use statboard::domain::ports::DurableCounterStore;
//!
//! let durable = Arc::new(InMemoryDurableStore::new());
//! let counts = durable.fetch_base_counts(EntityId(1)).await?;
//! ```

mod in_memory_durable;

pub use in_memory_durable::InMemoryDurableStore;
