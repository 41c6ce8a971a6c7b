use serde::{Deserialize, Serialize};

use crate::domain::ports::EntityId;

/// One ranked member.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: EntityId,
    pub score: f64,
}

/// A cursor page. Pass the last entry's id as the next cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingPage {
    pub entries: Vec<RankedEntry>,
    pub has_next: bool,
}

impl RankingPage {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Cursor for the following page, if any.
    pub fn next_cursor(&self) -> Option<EntityId> {
        if self.has_next {
            self.entries.last().map(|e| e.id)
        } else {
            None
        }
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(|e| e.id).collect()
    }
}
