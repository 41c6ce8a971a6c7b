//! Cache key schema
//!
//! All stores build their keys here so the layout stays consistent.
//! Key format: `{area}:{kind}:{identifier}[:sub_key]`

use crate::domain::ports::EntityId;

/// Width of an encoded ranking member; wide enough for `u64::MAX`.
pub const MEMBER_WIDTH: usize = 20;

/// Encode an entity id as a fixed-width, zero-padded ranking member so that
/// lexicographic order equals numeric order.
pub fn encode_member(id: EntityId) -> String {
    format!("{:0width$}", id.0, width = MEMBER_WIDTH)
}

/// Decode a ranking member back into an entity id.
pub fn decode_member(member: &str) -> Option<EntityId> {
    member.parse::<u64>().ok().map(EntityId)
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Counter Keys =============

    /// Unflushed view delta
    /// Format: counter:view:{id}
    pub fn view_delta(id: EntityId) -> String {
        format!("counter:view:{}", id)
    }

    /// Unflushed like delta
    /// Format: counter:like:{id}
    pub fn like_delta(id: EntityId) -> String {
        format!("counter:like:{}", id)
    }

    /// Users holding an unreconciled like
    /// Format: counter:liked:{id}
    pub fn like_members(id: EntityId) -> String {
        format!("counter:liked:{}", id)
    }

    /// Entities with unflushed deltas
    pub fn pending() -> String {
        "counter:pending".to_string()
    }

    /// Consecutive reconciliation failures
    /// Format: counter:failures:{id}
    pub fn failures(id: EntityId) -> String {
        format!("counter:failures:{}", id)
    }

    // ============= Ranking Keys =============

    /// All-time list
    pub fn ranking_global() -> String {
        "ranking:global".to_string()
    }

    /// Per-category list
    /// Format: ranking:category:{category_id}
    pub fn ranking_category(category_id: u64) -> String {
        format!("ranking:category:{}", category_id)
    }

    /// Per-metric, per-window list
    /// Format: ranking:{metric}:{window}
    pub fn ranking_windowed(metric: &str, window: &str) -> String {
        format!("ranking:{}:{}", metric, window)
    }

    // ============= Snapshot Keys =============

    /// Serialized snapshot payload
    /// Format: snapshot:{namespace}:{id}
    pub fn snapshot(namespace: &str, id: EntityId) -> String {
        format!("snapshot:{}:{}", namespace, id)
    }

    /// Last applied event timestamp for a snapshot
    /// Format: snapshot:{namespace}:{id}:state
    pub fn snapshot_state(namespace: &str, id: EntityId) -> String {
        format!("snapshot:{}:{}:state", namespace, id)
    }
}

// =============================================================================
// Tests
// =============================================================================
