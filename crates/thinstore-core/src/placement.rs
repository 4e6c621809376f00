//! Tier placement
//!
//! [`TierPolicy`] predicts a tier from a file's effective age and
//! [`TierLayout`] maps `(virtual path, tier)` to a physical location:
//!
//! ```text
//! <root>/hot/<encoded path>
//! <root>/warm/<encoded path>
//! <root>/cold/<encoded path>
//! <root>/frozen/<encoded path>
//! ```
//!
//! Virtual paths are flattened to a single filename by percent-encoding
//! `%`, `/`, `\` and `:`, which keeps distinct paths distinct.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use thinstore_common::config::TieringConfig;
use thinstore_common::{Error, Result, Tier};

/// Smallest priority used as a divisor when computing effective age
const MIN_PRIORITY_DIVISOR: f64 = 0.01;

/// Longest encoded filename most filesystems accept
pub const MAX_ENCODED_LEN: usize = 255;

/// Physical directory layout for the tiers
#[derive(Debug, Clone)]
pub struct TierLayout {
    root: PathBuf,
}

impl TierLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the files of `tier`
    pub fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.root.join(tier.dir_name())
    }

    /// Physical location of `virtual_path` when placed in `tier`
    pub fn physical_path(&self, virtual_path: &str, tier: Tier) -> PathBuf {
        self.tier_dir(tier).join(encode_path(virtual_path))
    }

    /// Tier whose directory contains `physical_path`
    pub fn tier_of(&self, physical_path: &Path) -> Option<Tier> {
        let parent = physical_path.parent()?;
        Tier::ALL.into_iter().find(|t| parent == self.tier_dir(*t))
    }

    /// Create the root and every tier directory
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        for tier in Tier::ALL {
            tokio::fs::create_dir_all(self.tier_dir(tier)).await?;
        }
        Ok(())
    }
}

/// Check that a virtual path can be stored
pub fn validate_path(virtual_path: &str) -> Result<()> {
    if virtual_path.is_empty() {
        return Err(Error::InvalidPath("path is empty".to_string()));
    }
    if virtual_path.contains('\0') {
        return Err(Error::InvalidPath(format!("{virtual_path:?} contains NUL")));
    }
    let encoded = encode_path(virtual_path);
    if matches!(encoded.as_str(), "." | "..") {
        return Err(Error::InvalidPath(format!(
            "{virtual_path:?} is not a file name"
        )));
    }
    if encoded.len() > MAX_ENCODED_LEN {
        return Err(Error::InvalidPath(format!(
            "path encodes to {} bytes, limit is {MAX_ENCODED_LEN}",
            encoded.len()
        )));
    }
    Ok(())
}

/// Flatten a virtual path into a single filename
pub fn encode_path(virtual_path: &str) -> String {
    let mut out = String::with_capacity(virtual_path.len());
    for ch in virtual_path.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

/// Age-based tier prediction
///
/// Effective age is the time since last access divided by the priority
/// score, so higher-priority files stay hot longer.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    config: TieringConfig,
}

impl TierPolicy {
    pub const fn new(config: TieringConfig) -> Self {
        Self { config }
    }

    /// Effective age in hours
    pub fn effective_age_hours(
        last_access: DateTime<Utc>,
        priority: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let age_hours = (now - last_access).num_milliseconds().max(0) as f64 / 3_600_000.0;
        age_hours / priority.max(MIN_PRIORITY_DIVISOR)
    }

    /// Tier a file should occupy
    pub fn predict(&self, last_access: DateTime<Utc>, priority: f64, now: DateTime<Utc>) -> Tier {
        let age = Self::effective_age_hours(last_access, priority, now);
        if age < self.config.hot_hours {
            Tier::Hot
        } else if age < self.config.warm_hours {
            Tier::Warm
        } else if age < self.config.cold_hours {
            Tier::Cold
        } else {
            Tier::Frozen
        }
    }
}

/// Move bytes between tier directories
pub async fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(from, to).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_encode_path_is_flat_and_injective() {
        assert_eq!(encode_path("docs/a.txt"), "docs%2Fa.txt");
        assert_eq!(encode_path("c:\\x"), "c%3A%5Cx");
        assert_ne!(encode_path("a/b"), encode_path("a%2Fb"));
        assert!(!encode_path("deep/nested/path").contains('/'));
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("docs/a.txt").is_ok());
        assert!(matches!(validate_path(""), Err(Error::InvalidPath(_))));
        assert!(validate_path("..").is_err());
        assert!(validate_path("a\0b").is_err());
        assert!(validate_path("../escape").is_ok());

        assert!(validate_path(&"x".repeat(MAX_ENCODED_LEN)).is_ok());
        assert!(matches!(
            validate_path(&format!("dir/{}", "x".repeat(300))),
            Err(Error::InvalidPath(_))
        ));
        // 100 separators encode to 300 bytes.
        assert!(validate_path(&"/".repeat(100)).is_err());
    }

    #[test]
    fn test_physical_path_matches_tier() {
        let layout = TierLayout::new("/data");
        for tier in Tier::ALL {
            let path = layout.physical_path("dir/file.bin", tier);
            assert_eq!(layout.tier_of(&path), Some(tier));
            assert!(path.starts_with(format!("/data/{}", tier.dir_name())));
        }
        assert_eq!(layout.tier_of(Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn test_predict_thresholds() {
        let policy = TierPolicy::new(TieringConfig::default());
        let now = Utc::now();
        assert_eq!(policy.predict(now - Duration::minutes(30), 1.0, now), Tier::Hot);
        assert_eq!(policy.predict(now - Duration::hours(5), 1.0, now), Tier::Warm);
        assert_eq!(policy.predict(now - Duration::hours(48), 1.0, now), Tier::Cold);
        assert_eq!(policy.predict(now - Duration::hours(200), 1.0, now), Tier::Frozen);
    }

    #[test]
    fn test_priority_dilates_age() {
        let policy = TierPolicy::new(TieringConfig::default());
        let now = Utc::now();
        let last = now - Duration::minutes(90);
        assert_eq!(policy.predict(last, 1.0, now), Tier::Warm);
        assert_eq!(policy.predict(last, 2.0, now), Tier::Hot);
        assert_eq!(policy.predict(now - Duration::hours(200), 2.0, now), Tier::Cold);
        // Zero priority must not divide by zero.
        assert_eq!(policy.predict(now - Duration::minutes(1), 0.0, now), Tier::Warm);
    }

    #[test]
    fn test_future_access_counts_as_fresh() {
        let policy = TierPolicy::new(TieringConfig::default());
        let now = Utc::now();
        assert_eq!(policy.predict(now + Duration::hours(3), 1.0, now), Tier::Hot);
    }

    #[tokio::test]
    async fn test_relocate_creates_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TierLayout::new(dir.path());
        let from = layout.physical_path("f", Tier::Hot);
        tokio::fs::create_dir_all(from.parent().unwrap()).await.unwrap();
        tokio::fs::write(&from, b"abc").await.unwrap();

        let to = layout.physical_path("f", Tier::Cold);
        relocate(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(tokio::fs::read(&to).await.unwrap(), b"abc");
    }
}
