//! Domain Events
//!
//! Write-path events delivered by the community backend. Every event carries
//! the id of the entity it touches and a monotonic `event_timestamp`
//! (milliseconds) used as the idempotency watermark when it is applied.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::board_liked(7, 42, created_at, 1_700_000_000_000);
//! projector.apply(&event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::{EntityId, UserId};

/// Domain event representing a write on the community side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Board Events
    // =========================================================================
    /// A board was published.
    BoardCreated {
        board_id: EntityId,
        category_id: u64,
        created_at: DateTime<Utc>,
        payload: serde_json::Value,
        event_timestamp: i64,
    },

    /// A board's content changed.
    BoardUpdated {
        board_id: EntityId,
        category_id: u64,
        created_at: DateTime<Utc>,
        payload: serde_json::Value,
        event_timestamp: i64,
    },

    /// A board was deleted.
    BoardDeleted {
        board_id: EntityId,
        category_id: u64,
        event_timestamp: i64,
    },

    /// A board detail page was viewed.
    BoardViewed {
        board_id: EntityId,
        created_at: DateTime<Utc>,
        event_timestamp: i64,
    },

    /// A user liked a board.
    BoardLiked {
        board_id: EntityId,
        user_id: UserId,
        created_at: DateTime<Utc>,
        event_timestamp: i64,
    },

    /// A user withdrew their like.
    BoardUnliked {
        board_id: EntityId,
        user_id: UserId,
        created_at: DateTime<Utc>,
        event_timestamp: i64,
    },

    // =========================================================================
    // Comment Events
    // =========================================================================
    /// A comment was posted.
    CommentCreated {
        comment_id: EntityId,
        board_id: EntityId,
        payload: serde_json::Value,
        event_timestamp: i64,
    },

    /// A comment was edited.
    CommentUpdated {
        comment_id: EntityId,
        board_id: EntityId,
        payload: serde_json::Value,
        event_timestamp: i64,
    },

    /// A comment was deleted.
    CommentDeleted {
        comment_id: EntityId,
        board_id: EntityId,
        event_timestamp: i64,
    },
}

impl DomainEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::BoardCreated { .. } => "BoardCreated",
            DomainEvent::BoardUpdated { .. } => "BoardUpdated",
            DomainEvent::BoardDeleted { .. } => "BoardDeleted",
            DomainEvent::BoardViewed { .. } => "BoardViewed",
            DomainEvent::BoardLiked { .. } => "BoardLiked",
            DomainEvent::BoardUnliked { .. } => "BoardUnliked",
            DomainEvent::CommentCreated { .. } => "CommentCreated",
            DomainEvent::CommentUpdated { .. } => "CommentUpdated",
            DomainEvent::CommentDeleted { .. } => "CommentDeleted",
        }
    }

    /// The entity the event is about.
    pub fn entity_id(&self) -> EntityId {
        match self {
            DomainEvent::BoardCreated { board_id, .. }
            | DomainEvent::BoardUpdated { board_id, .. }
            | DomainEvent::BoardDeleted { board_id, .. }
            | DomainEvent::BoardViewed { board_id, .. }
            | DomainEvent::BoardLiked { board_id, .. }
            | DomainEvent::BoardUnliked { board_id, .. } => *board_id,
            DomainEvent::CommentCreated { comment_id, .. }
            | DomainEvent::CommentUpdated { comment_id, .. }
            | DomainEvent::CommentDeleted { comment_id, .. } => *comment_id,
        }
    }

    /// Get the event's idempotency timestamp (milliseconds).
    pub fn event_timestamp(&self) -> i64 {
        match self {
            DomainEvent::BoardCreated { event_timestamp, .. }
            | DomainEvent::BoardUpdated { event_timestamp, .. }
            | DomainEvent::BoardDeleted { event_timestamp, .. }
            | DomainEvent::BoardViewed { event_timestamp, .. }
            | DomainEvent::BoardLiked { event_timestamp, .. }
            | DomainEvent::BoardUnliked { event_timestamp, .. }
            | DomainEvent::CommentCreated { event_timestamp, .. }
            | DomainEvent::CommentUpdated { event_timestamp, .. }
            | DomainEvent::CommentDeleted { event_timestamp, .. } => *event_timestamp,
        }
    }

    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Create a BoardCreated event.
    pub fn board_created(
        board_id: u64,
        category_id: u64,
        created_at: DateTime<Utc>,
        payload: serde_json::Value,
        event_timestamp: i64,
    ) -> Self {
        DomainEvent::BoardCreated {
            board_id: EntityId(board_id),
            category_id,
            created_at,
            payload,
            event_timestamp,
        }
    }

    /// Create a BoardUpdated event.
    pub fn board_updated(
        board_id: u64,
        category_id: u64,
        created_at: DateTime<Utc>,
        payload: serde_json::Value,
        event_timestamp: i64,
    ) -> Self {
        DomainEvent::BoardUpdated {
            board_id: EntityId(board_id),
            category_id,
            created_at,
            payload,
            event_timestamp,
        }
    }

    /// Create a BoardDeleted event.
    pub fn board_deleted(board_id: u64, category_id: u64, event_timestamp: i64) -> Self {
        DomainEvent::BoardDeleted {
            board_id: EntityId(board_id),
            category_id,
            event_timestamp,
        }
    }

    /// Create a BoardViewed event.
    pub fn board_viewed(board_id: u64, created_at: DateTime<Utc>, event_timestamp: i64) -> Self {
        DomainEvent::BoardViewed {
            board_id: EntityId(board_id),
            created_at,
            event_timestamp,
        }
    }

    /// Create a BoardLiked event.
    pub fn board_liked(
        board_id: u64,
        user_id: u64,
        created_at: DateTime<Utc>,
        event_timestamp: i64,
    ) -> Self {
        DomainEvent::BoardLiked {
            board_id: EntityId(board_id),
            user_id: UserId(user_id),
            created_at,
            event_timestamp,
        }
    }

    /// Create a BoardUnliked event.
    pub fn board_unliked(
        board_id: u64,
        user_id: u64,
        created_at: DateTime<Utc>,
        event_timestamp: i64,
    ) -> Self {
        DomainEvent::BoardUnliked {
            board_id: EntityId(board_id),
            user_id: UserId(user_id),
            created_at,
            event_timestamp,
        }
    }

    /// Create a CommentCreated event.
    pub fn comment_created(
        comment_id: u64,
        board_id: u64,
        payload: serde_json::Value,
        event_timestamp: i64,
    ) -> Self {
        DomainEvent::CommentCreated {
            comment_id: EntityId(comment_id),
            board_id: EntityId(board_id),
            payload,
            event_timestamp,
        }
    }

    /// Create a CommentUpdated event.
    pub fn comment_updated(
        comment_id: u64,
        board_id: u64,
        payload: serde_json::Value,
        event_timestamp: i64,
    ) -> Self {
        DomainEvent::CommentUpdated {
            comment_id: EntityId(comment_id),
            board_id: EntityId(board_id),
            payload,
            event_timestamp,
        }
    }

    /// Create a CommentDeleted event.
    pub fn comment_deleted(comment_id: u64, board_id: u64, event_timestamp: i64) -> Self {
        DomainEvent::CommentDeleted {
            comment_id: EntityId(comment_id),
            board_id: EntityId(board_id),
            event_timestamp,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::board_created(7, 3, Utc::now(), json!({"title": "hi"}), 100);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("BoardCreated"));
        assert!(json.contains("\"board_id\":7"));

        let deserialized: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), "BoardCreated");
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_entity_id_extraction() {
        let like = DomainEvent::board_liked(9, 1, Utc::now(), 5);
        assert_eq!(like.entity_id(), EntityId(9));

        let comment = DomainEvent::comment_deleted(44, 9, 6);
        assert_eq!(comment.entity_id(), EntityId(44));
        assert_eq!(comment.event_type(), "CommentDeleted");
    }

    #[test]
    fn test_event_timestamp() {
        let event = DomainEvent::board_deleted(1, 2, 1_700_000_000_000);
        assert_eq!(event.event_timestamp(), 1_700_000_000_000);
    }
}
