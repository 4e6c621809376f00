//! Read cache for virtual files
//!
//! A byte-budgeted, strict least-recently-used cache of whole-file contents
//! keyed by virtual path. It is independent of tier placement: eviction drops
//! the cached copy, never the file.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thinstore_common::config::CacheConfig;
use tracing::debug;

/// One cached file
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// File contents
    pub data: Bytes,
    /// Logical clock of the last hit, for LRU ordering
    last_hit: u64,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    used_bytes: u64,
    budget_bytes: u64,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, path: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(path)?;
        self.used_bytes = self.used_bytes.saturating_sub(entry.data.len() as u64);
        Some(entry)
    }

    /// Least recently used entry, optionally skipping one key
    fn lru_key(&self, skip: Option<&str>) -> Option<String> {
        self.entries
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != skip)
            .min_by_key(|(_, entry)| entry.last_hit)
            .map(|(key, _)| key.clone())
    }
}

/// Result of a trim pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// Entries evicted
    pub evicted: usize,
    /// Bytes released
    pub freed_bytes: u64,
    /// Cached bytes after the pass
    pub used_bytes: u64,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub used_bytes: u64,
    pub budget_bytes: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.hits as f64 / total as f64;
        ratio
    }
}

/// Bounded LRU read cache
pub struct ReadCache {
    state: Mutex<CacheState>,
    priority_threshold: f64,
    max_entry_fraction: f64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ReadCache {
    /// Create an empty cache
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                used_bytes: 0,
                budget_bytes: config.budget_bytes,
                clock: 0,
            }),
            priority_threshold: config.priority_threshold,
            max_entry_fraction: config.max_entry_fraction,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Check if a file with this priority and size may be cached
    ///
    /// Eligible files have a priority above the threshold and are smaller
    /// than `max_entry_fraction` of the budget.
    pub fn is_eligible(&self, priority: f64, size: u64) -> bool {
        priority > self.priority_threshold && size < self.max_entry_bytes()
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn max_entry_bytes(&self) -> u64 {
        let budget = self.state.lock().budget_bytes;
        (budget as f64 * self.max_entry_fraction) as u64
    }

    /// Look up a file, refreshing its recency on a hit
    pub fn get(&self, path: &str) -> Option<Bytes> {
        let mut state = self.state.lock();
        let clock = state.tick();
        if let Some(entry) = state.entries.get_mut(path) {
            entry.last_hit = clock;
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.data.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert or refresh a file's contents
    ///
    /// Older entries are evicted, least recently used first, until the
    /// budget holds. Contents larger than the whole budget are refused.
    pub fn insert(&self, path: &str, data: Bytes) -> bool {
        let size = data.len() as u64;
        let mut state = self.state.lock();
        if size > state.budget_bytes {
            return false;
        }

        state.remove(path);
        let clock = state.tick();
        state.used_bytes += size;
        state.entries.insert(
            path.to_string(),
            CacheEntry {
                data,
                last_hit: clock,
            },
        );

        while state.used_bytes > state.budget_bytes {
            let Some(victim) = state.lru_key(Some(path)) else {
                break;
            };
            state.remove(&victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("Evicted {} from read cache to admit {}", victim, path);
        }
        true
    }

    /// Drop a file's cached contents
    pub fn invalidate(&self, path: &str) -> bool {
        self.state.lock().remove(path).is_some()
    }

    /// Evict least recently used entries until usage is within budget
    pub fn trim(&self) -> TrimReport {
        let mut state = self.state.lock();
        let mut report = TrimReport::default();

        while state.used_bytes > state.budget_bytes {
            let Some(victim) = state.lru_key(None) else {
                break;
            };
            if let Some(entry) = state.remove(&victim) {
                report.evicted += 1;
                report.freed_bytes += entry.data.len() as u64;
                debug!("Trimmed {} from read cache", victim);
            }
        }

        self.evictions
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        report.used_bytes = state.used_bytes;
        report
    }

    /// Change the byte budget; the next trim enforces it
    pub fn resize(&self, budget_bytes: u64) {
        self.state.lock().budget_bytes = budget_bytes;
    }

    /// Check if a file is cached
    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().entries.contains_key(path)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    #[cfg(test)]
    fn used_bytes(&self) -> u64 {
        self.state.lock().used_bytes
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: state.entries.len(),
            used_bytes: state.used_bytes,
            budget_bytes: state.budget_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(budget: u64) -> ReadCache {
        ReadCache::new(&CacheConfig {
            budget_bytes: budget,
            ..CacheConfig::default()
        })
    }

    fn bytes(len: usize) -> Bytes {
        Bytes::from(vec![7u8; len])
    }

    #[test]
    fn test_insert_and_get() {
        let cache = cache(1000);
        assert!(cache.insert("a", Bytes::from_static(b"hello")));
        assert_eq!(cache.get("a").unwrap(), Bytes::from_static(b"hello"));
        assert!(cache.get("b").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.used_bytes, 5);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
        assert!(cache.contains("a"));
    }

    #[test]
    fn test_eligibility() {
        let cache = cache(1000);
        assert!(cache.is_eligible(1.6, 99));
        assert!(!cache.is_eligible(1.5, 99));
        assert!(!cache.is_eligible(1.9, 100));
    }

    #[test]
    fn test_refresh_replaces_size() {
        let cache = cache(1000);
        cache.insert("a", bytes(100));
        cache.insert("a", bytes(40));
        assert_eq!(cache.used_bytes(), 40);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_evicts_lru() {
        let cache = cache(300);
        cache.insert("a", bytes(100));
        cache.insert("b", bytes(100));
        cache.insert("c", bytes(100));

        // Touch a so b becomes the oldest
        cache.get("a");
        cache.insert("d", bytes(100));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.used_bytes(), 300);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_insert_refused() {
        let cache = cache(10);
        assert!(!cache.insert("big", bytes(11)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_trim_after_resize_removes_oldest_first() {
        let cache = cache(1000);
        for name in ["a", "b", "c", "d"] {
            cache.insert(name, bytes(100));
        }
        cache.get("a");

        cache.resize(250);
        let report = cache.trim();

        assert_eq!(report.evicted, 2);
        assert_eq!(report.freed_bytes, 200);
        assert_eq!(report.used_bytes, 200);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(!cache.contains("c"));
        assert!(cache.contains("d"));
    }

    #[test]
    fn test_trim_within_budget_is_noop() {
        let cache = cache(1000);
        cache.insert("a", bytes(10));
        assert_eq!(cache.trim(), TrimReport {
            evicted: 0,
            freed_bytes: 0,
            used_bytes: 10,
        });
    }

    #[test]
    fn test_invalidate() {
        let cache = cache(1000);
        cache.insert("a", bytes(10));
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.used_bytes(), 0);
    }
}
