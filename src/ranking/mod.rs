//! Time-Windowed Ranking Store
//!
//! Bounded leaderboards kept as cache sorted sets. Members are fixed-width
//! encoded entity ids; scores are creation timestamps (recency lists) or
//! metric totals (windowed lists).
//!
//! | List | Key | Score | Cap |
//! |------|-----|-------|-----|
//! | `Global` | `ranking:global` | created-at millis | `global_cap` |
//! | `Category` | `ranking:category:{c}` | created-at millis | `category_cap` |
//! | `Windowed` | `ranking:{metric}:{window}` | likes / views | `window_cap` |
//!
//! Every insert trims its list back to the cap in the same batch. Windowed
//! inserts are refused for entities older than the window horizon.
//!
//! Cursor pages continue strictly below the anchor's score, so inserts above
//! the cursor never shift later pages. An anchor that has been trimmed away
//! yields an empty page.

mod list;
mod page;
mod store;

pub use list::{Metric, RankingList, TimeWindow};
pub use page::{RankedEntry, RankingPage};
pub use store::{RankingStore, SCORE_EPSILON};
