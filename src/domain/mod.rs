//! Domain Layer
//!
//! Value objects, events and ports shared by the stores.
//!
//! - **Ports** (`ports.rs`) - identifiers, baseline counts and the durable-store trait
//! - **Events** (`events.rs`) - write-path events applied by the projector
//!
//! # Usage
//!
//! ```ignore
//! use statboard::domain::ports::{DurableCounterStore, EntityId};
//!
//! async fn base_likes<D: DurableCounterStore>(store: &D, id: EntityId) -> i64 {
//!     store.fetch_base_counts(id).await.map(|c| c.like).unwrap_or(0)
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::DomainEvent;
pub use ports::{BaseCounts, DurableCounterStore, EntityId, UserId};
