//! Idempotent Snapshot Cache
//!
//! Serialized entity snapshots guarded by an event-timestamp watermark.
//! Events carry a monotonic `event_timestamp`; a write with a timestamp at or
//! below the stored watermark is dropped silently, which makes replays and
//! out-of-order delivery harmless.
//!
//! ```text
//! snapshot:{namespace}:{id}        payload bytes
//! snapshot:{namespace}:{id}:state  last applied event timestamp
//! ```

mod cache;
mod entry;

pub use cache::SnapshotCache;
pub use entry::Snapshot;
