//! Ranking list identities.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::config::RankingConfig;

/// Metric a windowed list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Likes,
    Views,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Likes, Metric::Views];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Likes => "likes",
            Metric::Views => "views",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trailing creation-time horizon of a windowed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    Week,
    Month,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 3] = [TimeWindow::Day, TimeWindow::Week, TimeWindow::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
        }
    }

    pub fn horizon(&self) -> Duration {
        match self {
            TimeWindow::Day => Duration::days(1),
            TimeWindow::Week => Duration::days(7),
            TimeWindow::Month => Duration::days(30),
        }
    }

    /// Whether an entity of the given age belongs in this window.
    pub fn admits(&self, age: Duration) -> bool {
        age <= self.horizon()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankingList {
    /// All-time recency list
    Global,
    /// Recency list of one category
    Category { category_id: u64 },
    /// Metric leaderboard over a trailing window
    Windowed { metric: Metric, window: TimeWindow },
}

impl RankingList {
    pub fn category(category_id: u64) -> Self {
        RankingList::Category { category_id }
    }

    pub fn windowed(metric: Metric, window: TimeWindow) -> Self {
        RankingList::Windowed { metric, window }
    }

    /// Cache key of the backing sorted set.
    pub fn key(&self) -> String {
        match self {
            RankingList::Global => CacheKey::ranking_global(),
            RankingList::Category { category_id } => CacheKey::ranking_category(*category_id),
            RankingList::Windowed { metric, window } => {
                CacheKey::ranking_windowed(metric.as_str(), window.as_str())
            }
        }
    }

    /// Size bound for this list.
    pub fn cap(&self, config: &RankingConfig) -> usize {
        match self {
            RankingList::Global => config.global_cap,
            RankingList::Category { .. } => config.category_cap,
            RankingList::Windowed { .. } => config.window_cap,
        }
    }

    /// Every windowed list.
    pub fn all_windowed() -> impl Iterator<Item = RankingList> {
        Metric::ALL
            .into_iter()
            .flat_map(|metric| TimeWindow::ALL.into_iter().map(move |window| RankingList::windowed(metric, window)))
    }
}
