//! Counter Aggregation Store
//!
//! Write-behind view and like counters. Increments are absorbed in the cache
//! store as deltas; a periodic flush reconciles them into the durable store.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  increment_view / increment_like / decrement_like                 │
//! │        │                                                          │
//! │        ▼                                                          │
//! │  counter:view:{id}  counter:like:{id}  counter:liked:{id}         │
//! │        │                     counter:pending (set of ids)         │
//! │        ▼                                                          │
//! │  FlushScheduler ──tick──► CounterStore::flush                     │
//! │                              │  SREM pending + GETDEL deltas      │
//! │                              ▼                                    │
//! │                     DurableCounterStore::apply_delta              │
//! │                      true  → clear counter:failures:{id}          │
//! │                      false → INCR counter:failures:{id}, drop     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads return durable baseline + outstanding delta, clamped at zero.

mod flush;
mod scheduler;
mod stats;
mod store;

pub use flush::{FlushOutcome, FlushReport};
pub use scheduler::FlushScheduler;
pub use stats::FlushStats;
pub use store::{CounterBaseline, CounterStore, Counters};
