//! Core types for thinstore
//!
//! This module defines the fundamental data types shared across components:
//! storage tiers, virtual file metadata, the capacity quota snapshot and
//! per-file access history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Maximum number of access timestamps retained per file
pub const ACCESS_HISTORY_LEN: usize = 32;

/// Upper bound of a file's priority score
pub const MAX_PRIORITY: f64 = 2.0;

/// Priority assigned to newly created files
pub const INITIAL_PRIORITY: f64 = 1.0;

/// Storage tier, ordered by decreasing presumed access frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Recently accessed, kept on the fastest local storage
    Hot,
    /// Accessed within the last day
    Warm,
    /// Accessed within the last week
    Cold,
    /// Not accessed for over a week; eligible for offload
    Frozen,
}

impl Tier {
    /// All tiers, hottest first
    pub const ALL: [Tier; 4] = [Tier::Hot, Tier::Warm, Tier::Cold, Tier::Frozen];

    /// Directory name used for this tier under the storage root
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
            Tier::Frozen => "frozen",
        }
    }

    /// Position of the tier in [`Tier::ALL`]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(Tier::Hot),
            "warm" => Ok(Tier::Warm),
            "cold" => Ok(Tier::Cold),
            "frozen" => Ok(Tier::Frozen),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Bounded record of recent access timestamps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessHistory {
    accesses: VecDeque<DateTime<Utc>>,
}

impl AccessHistory {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access, dropping the oldest entry when full
    pub fn record(&mut self, at: DateTime<Utc>) {
        if self.accesses.len() == ACCESS_HISTORY_LEN {
            self.accesses.pop_front();
        }
        self.accesses.push_back(at);
    }

    /// Number of recorded accesses at or after `cutoff`
    #[must_use]
    pub fn accesses_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.accesses.iter().filter(|t| **t >= cutoff).count()
    }

    /// Number of retained accesses
    #[must_use]
    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    /// Check if no access has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }
}

/// Metadata for one file in the virtual namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualFile {
    /// Unique key in the virtual namespace
    pub virtual_path: String,
    /// Current on-medium location, always inside the directory of `tier`
    pub physical_path: PathBuf,
    /// Declared size at creation
    pub virtual_size: u64,
    /// Bytes written by the last write (0 until first write)
    pub physical_size: u64,
    /// Current placement
    pub tier: Tier,
    /// True if the read cache holds the contents
    pub is_cached: bool,
    /// True if the compression advisor estimated a useful reduction
    pub is_compressed: bool,
    /// True if the compression advisor reported the contents as encrypted
    pub is_encrypted: bool,
    /// Estimated fraction of bytes a compressor would save
    pub estimated_reduction: f64,
    /// True while the bytes are present on the local medium
    pub resident: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last read or write
    pub last_access: DateTime<Utc>,
    /// Priority in `[0, MAX_PRIORITY]`
    pub priority_score: f64,
    /// Location at the offload target once offloaded
    pub remote_location: Option<String>,
    /// Recent access timestamps
    pub history: AccessHistory,
}

impl VirtualFile {
    /// Create metadata for a freshly created, unwritten file in the hot tier
    pub fn new(virtual_path: String, physical_path: PathBuf, virtual_size: u64) -> Self {
        let now = Utc::now();
        Self {
            virtual_path,
            physical_path,
            virtual_size,
            physical_size: 0,
            tier: Tier::Hot,
            is_cached: false,
            is_compressed: false,
            is_encrypted: false,
            estimated_reduction: 0.0,
            resident: false,
            created_at: now,
            last_access: now,
            priority_score: INITIAL_PRIORITY,
            remote_location: None,
            history: AccessHistory::new(),
        }
    }

    /// Physical bytes this file currently consumes on the local medium
    #[must_use]
    pub const fn resident_bytes(&self) -> u64 {
        if self.resident { self.physical_size } else { 0 }
    }

    /// Check if the bytes live only at the offload target
    #[must_use]
    pub const fn is_offloaded(&self) -> bool {
        self.remote_location.is_some() && !self.resident
    }
}

/// Parent directory of a virtual path
#[must_use]
pub fn virtual_directory(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

/// Extension of a virtual path's final component
#[must_use]
pub fn virtual_extension(path: &str) -> &str {
    let name = path.rfind('/').map_or(path, |idx| &path[idx + 1..]);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx + 1..],
    }
}

/// Snapshot of the capacity ledger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageQuota {
    /// Bytes available on the physical medium
    pub physical_limit: u64,
    /// Bytes resident on the physical medium
    pub physical_used: u64,
    /// Bytes advertised to callers
    pub virtual_limit: u64,
    /// Bytes declared by existing files
    pub virtual_used: u64,
    /// Ratio of advertised to physical capacity
    pub overcommit_coefficient: f64,
}

impl StorageQuota {
    /// Remaining physical bytes
    #[must_use]
    pub const fn physical_available(&self) -> u64 {
        self.physical_limit.saturating_sub(self.physical_used)
    }

    /// Remaining virtual bytes (0 while usage exceeds a shrunk limit)
    #[must_use]
    pub const fn virtual_available(&self) -> u64 {
        self.virtual_limit.saturating_sub(self.virtual_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_tier_ordering_and_names() {
        assert!(Tier::Hot < Tier::Warm);
        assert!(Tier::Cold < Tier::Frozen);
        assert_eq!(Tier::Frozen.dir_name(), "frozen");
        assert_eq!("WARM".parse::<Tier>().unwrap(), Tier::Warm);
        assert!("lukewarm".parse::<Tier>().is_err());
        assert_eq!(Tier::Cold.index(), 2);
    }

    #[test]
    fn test_access_history_is_bounded() {
        let mut history = AccessHistory::new();
        let start = Utc::now() - Duration::hours(100);
        for i in 0..(ACCESS_HISTORY_LEN as i64 + 8) {
            history.record(start + Duration::hours(i));
        }
        assert_eq!(history.len(), ACCESS_HISTORY_LEN);
        assert_eq!(history.accesses.front().copied(), Some(start + Duration::hours(8)));
        assert_eq!(history.accesses_since(start + Duration::hours(36)), 4);
    }

    #[test]
    fn test_virtual_path_parts() {
        assert_eq!(virtual_directory("docs/report.pdf"), "docs");
        assert_eq!(virtual_directory("report.pdf"), "");
        assert_eq!(virtual_extension("docs/report.pdf"), "pdf");
        assert_eq!(virtual_extension("docs.d/README"), "");
        assert_eq!(virtual_extension(".bashrc"), "");
    }

    #[test]
    fn test_resident_bytes() {
        let mut file = VirtualFile::new("a".into(), PathBuf::from("/r/hot/a"), 100);
        assert_eq!(file.resident_bytes(), 0);
        file.physical_size = 40;
        file.resident = true;
        assert_eq!(file.resident_bytes(), 40);
        file.remote_location = Some("loc".into());
        assert!(!file.is_offloaded());
        file.resident = false;
        assert!(file.is_offloaded());
    }

    #[test]
    fn test_quota_available_saturates() {
        let quota = StorageQuota {
            physical_limit: 100,
            physical_used: 30,
            virtual_limit: 200,
            virtual_used: 250,
            overcommit_coefficient: 2.0,
        };
        assert_eq!(quota.physical_available(), 70);
        assert_eq!(quota.virtual_available(), 0);
    }
}
