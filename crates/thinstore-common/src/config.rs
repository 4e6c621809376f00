//! Configuration types for thinstore
//!
//! This module defines the configuration tree loaded by the daemon and
//! consumed by the storage manager. Every section has defaults, so a
//! partial TOML file is enough.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for thinstore
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Physical storage configuration
    pub storage: StorageConfig,
    /// Overcommit coefficient policy
    pub overcommit: OvercommitConfig,
    /// Tier placement policy
    pub tiering: TieringConfig,
    /// Read cache configuration
    pub cache: CacheConfig,
    /// Remote offload configuration
    pub offload: OffloadConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check the configuration for inconsistent values
    pub fn validate(&self) -> Result<()> {
        if self.storage.physical_limit == 0 {
            return Err(Error::configuration("storage.physical_limit must be positive"));
        }
        let oc = &self.overcommit;
        if !(oc.min_coefficient > 0.0 && oc.min_coefficient <= oc.max_coefficient) {
            return Err(Error::configuration(format!(
                "overcommit coefficient range [{}, {}] is invalid",
                oc.min_coefficient, oc.max_coefficient
            )));
        }
        if oc.growth_step <= 1.0 {
            return Err(Error::configuration("overcommit.growth_step must exceed 1.0"));
        }
        let t = &self.tiering;
        if !(t.hot_hours > 0.0 && t.hot_hours < t.warm_hours && t.warm_hours < t.cold_hours) {
            return Err(Error::configuration(
                "tiering thresholds must satisfy 0 < hot < warm < cold",
            ));
        }
        if self.cache.budget_bytes == 0 {
            return Err(Error::configuration("cache.budget_bytes must be positive"));
        }
        if !(0.0..=1.0).contains(&self.cache.max_entry_fraction) {
            return Err(Error::configuration(
                "cache.max_entry_fraction must be within [0, 1]",
            ));
        }
        for (name, secs) in [
            ("overcommit.recompute_interval_secs", oc.recompute_interval_secs),
            ("tiering.rebalance_interval_secs", t.rebalance_interval_secs),
            ("cache.trim_interval_secs", self.cache.trim_interval_secs),
        ] {
            if secs == 0 {
                return Err(Error::configuration(format!("{name} must be positive")));
            }
        }
        if self.offload.enabled && self.offload.directory.is_none() {
            return Err(Error::configuration(
                "offload.directory is required when offload is enabled",
            ));
        }
        Ok(())
    }
}

/// Physical storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per tier
    pub root: PathBuf,
    /// Physical capacity in bytes
    pub physical_limit: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/thinstore"),
            physical_limit: 10 * 1024 * 1024 * 1024, // 10 GiB
        }
    }
}

/// Overcommit coefficient policy
///
/// The coefficient is a heuristic target, not a measured compression ratio:
/// `base + compression_weight * efficiency + offload_bonus + locality_weight * locality`,
/// clamped to `[min_coefficient, max_coefficient]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OvercommitConfig {
    /// Coefficient before any boost
    pub base: f64,
    /// Lower clamp
    pub min_coefficient: f64,
    /// Upper clamp
    pub max_coefficient: f64,
    /// Multiplicative growth applied when a create needs headroom
    pub growth_step: f64,
    /// Weight of the fraction of bytes saved by compressed files
    pub compression_weight: f64,
    /// Flat bonus while any bytes are offloaded
    pub offload_bonus: f64,
    /// Weight of the average related-files score
    pub locality_weight: f64,
    /// Recompute period (seconds)
    pub recompute_interval_secs: u64,
}

impl Default for OvercommitConfig {
    fn default() -> Self {
        Self {
            base: 2.0,
            min_coefficient: 1.5,
            max_coefficient: 10.0,
            growth_step: 1.1,
            compression_weight: 0.3,
            offload_bonus: 1.5,
            locality_weight: 0.5,
            recompute_interval_secs: 15 * 60,
        }
    }
}

impl OvercommitConfig {
    /// Recompute period as a duration
    #[must_use]
    pub const fn recompute_interval(&self) -> Duration {
        Duration::from_secs(self.recompute_interval_secs)
    }
}

/// Tier placement policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    /// Effective age (hours) below which a file is hot
    pub hot_hours: f64,
    /// Effective age (hours) below which a file is warm
    pub warm_hours: f64,
    /// Effective age (hours) below which a file is cold; older is frozen
    pub cold_hours: f64,
    /// Rebalance period (seconds)
    pub rebalance_interval_secs: u64,
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            hot_hours: 1.0,
            warm_hours: 24.0,
            cold_hours: 168.0,
            rebalance_interval_secs: 10 * 60,
        }
    }
}

impl TieringConfig {
    /// Rebalance period as a duration
    #[must_use]
    pub const fn rebalance_interval(&self) -> Duration {
        Duration::from_secs(self.rebalance_interval_secs)
    }
}

/// Read cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget
    pub budget_bytes: u64,
    /// Priority a file must exceed to be admitted
    pub priority_threshold: f64,
    /// Largest admissible entry as a fraction of the budget
    pub max_entry_fraction: f64,
    /// Trim period (seconds)
    pub trim_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 1024 * 1024 * 1024, // 1 GiB
            priority_threshold: 1.5,
            max_entry_fraction: 0.1,
            trim_interval_secs: 5 * 60,
        }
    }
}

impl CacheConfig {
    /// Trim period as a duration
    #[must_use]
    pub const fn trim_interval(&self) -> Duration {
        Duration::from_secs(self.trim_interval_secs)
    }
}

/// Remote offload configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Offload frozen files and release their local bytes
    pub enabled: bool,
    /// Directory used by the bundled local offload target
    pub directory: Option<PathBuf>,
    /// Bound on every upload/download/delete call (seconds)
    pub timeout_secs: u64,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            timeout_secs: 30,
        }
    }
}

impl OffloadConfig {
    /// Call timeout as a duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!((config.overcommit.base - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.cache.budget_bytes, 1 << 30);
        assert_eq!(config.tiering.rebalance_interval(), Duration::from_secs(600));
        assert_eq!(config.overcommit.recompute_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            root = "/tmp/thin"
            physical_limit = 1073741824

            [overcommit]
            max_coefficient = 4.0
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.root, PathBuf::from("/tmp/thin"));
        assert_eq!(config.storage.physical_limit, 1 << 30);
        assert!((config.overcommit.max_coefficient - 4.0).abs() < f64::EPSILON);
        assert!((config.overcommit.min_coefficient - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.overcommit.min_coefficient = 12.0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.tiering.warm_hours = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.offload.enabled = true;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.physical_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.trim_interval_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.overcommit.recompute_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tiering.rebalance_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
