//! Engine configuration
//!
//! Loaded from YAML (every field optional) and overridable from the CLI.
//!
//! ```yaml
//! counter:
//!   max_retry_count: 3
//!   flush_interval_secs: 60
//! ranking:
//!   global_cap: 1000
//!   category_cap: 1000
//!   window_cap: 100
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default reconciliation attempts before an entity's deltas are dropped
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 3;

/// Default flush period
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// Default bound of the all-time list
pub const DEFAULT_GLOBAL_CAP: usize = 1000;

/// Default bound of each category list
pub const DEFAULT_CATEGORY_CAP: usize = 1000;

/// Default bound of each time-windowed list
pub const DEFAULT_WINDOW_CAP: usize = 100;

/// Counter store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Failed reconciliations tolerated before an entity is skipped
    pub max_retry_count: u32,
    /// Seconds between flush cycles
    pub flush_interval_secs: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }
}

impl CounterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

/// Ranking store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub global_cap: usize,
    pub category_cap: usize,
    pub window_cap: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            global_cap: DEFAULT_GLOBAL_CAP,
            category_cap: DEFAULT_CATEGORY_CAP,
            window_cap: DEFAULT_WINDOW_CAP,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub counter: CounterConfig,
    pub ranking: RankingConfig,
}

impl EngineConfig {
    /// Parse from a YAML document and validate.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.counter.max_retry_count == 0 {
            return Err(Error::Config("counter.max_retry_count must be > 0".into()));
        }
        if self.counter.flush_interval_secs == 0 {
            return Err(Error::Config("counter.flush_interval_secs must be > 0".into()));
        }
        if self.ranking.global_cap == 0 {
            return Err(Error::Config("ranking.global_cap must be > 0".into()));
        }
        if self.ranking.category_cap == 0 {
            return Err(Error::Config("ranking.category_cap must be > 0".into()));
        }
        if self.ranking.window_cap == 0 {
            return Err(Error::Config("ranking.window_cap must be > 0".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.counter.max_retry_count, 3);
        assert_eq!(config.counter.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.ranking.global_cap, 1000);
        assert_eq!(config.ranking.window_cap, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str("counter:\n  max_retry_count: 2\n").unwrap();
        assert_eq!(config.counter.max_retry_count, 2);
        assert_eq!(config.counter.flush_interval_secs, 60);
        assert_eq!(config.ranking, RankingConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.ranking.window_cap = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = EngineConfig::default();
        config.counter.max_retry_count = 0;
        assert!(config.validate().is_err());

        assert!(EngineConfig::from_yaml_str("counter:\n  flush_interval_secs: 0\n").is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        assert_matches!(
            EngineConfig::from_yaml_str("counter: [1, 2"),
            Err(Error::Config(_))
        );
    }
}
