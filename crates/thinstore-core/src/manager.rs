//! Storage manager
//!
//! Public I/O surface composing the file table, capacity ledger, tier
//! placement, read cache and the collaborators. Every operation runs under
//! the table lock, so operations on the same path are linearized and no
//! caller observes a half-updated file or quota. The cache has its own lock
//! and is only ever taken while the table lock is held, never the reverse.

use crate::background::BackgroundTasks;
use crate::cache::{CacheStats, ReadCache, TrimReport};
use crate::coefficient::{self, CoefficientBreakdown, CoefficientEngine, CoefficientInputs, to_f64};
use crate::collaborators::{CompressionAdvisor, EntropyAdvisor, FrequencyScorer, PriorityScorer};
use crate::ledger::CapacityLedger;
use crate::metrics::{MetricsSink, RecorderSink};
use crate::offload::{LocalDirOffload, OffloadError, OffloadTarget, with_timeout};
use crate::placement::{self, TierLayout, TierPolicy, validate_path};
use crate::table::FileTable;
use crate::COMPRESSIBLE_THRESHOLD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thinstore_common::{Config, Error, MAX_PRIORITY, Result, StorageQuota, Tier, VirtualFile};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Attempts made for a remote download before giving up
const DOWNLOAD_ATTEMPTS: u32 = 2;

/// Outcome of one rebalance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    /// Files examined
    pub scanned: usize,
    /// Files moved to a different tier
    pub moved: usize,
    /// Files whose local bytes were released after offload
    pub offloaded: usize,
    /// Local bytes released by this pass
    pub offloaded_bytes: u64,
    /// Files that could not be moved or offloaded
    pub failures: usize,
}

/// Builder for [`StorageManager`]
pub struct StorageManagerBuilder {
    config: Config,
    advisor: Option<Arc<dyn CompressionAdvisor>>,
    scorer: Option<Arc<dyn PriorityScorer>>,
    offload: Option<Arc<dyn OffloadTarget>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    offload_timeout: Option<Duration>,
}

impl StorageManagerBuilder {
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            advisor: None,
            scorer: None,
            offload: None,
            metrics: None,
            offload_timeout: None,
        }
    }

    /// Use a custom compression advisor (default: [`EntropyAdvisor`])
    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<dyn CompressionAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Use a custom priority scorer (default: [`FrequencyScorer`])
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn PriorityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Use an offload target instead of the configured local directory
    #[must_use]
    pub fn with_offload(mut self, offload: Arc<dyn OffloadTarget>) -> Self {
        self.offload = Some(offload);
        self
    }

    /// Use a custom metrics sink (default: [`RecorderSink`])
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Override `offload.timeout_secs` for offload calls
    #[must_use]
    pub fn with_offload_timeout(mut self, timeout: Duration) -> Self {
        self.offload_timeout = Some(timeout);
        self
    }

    /// Validate the configuration, prepare the tier directories and build
    /// the manager
    pub async fn build(self) -> Result<StorageManager> {
        let config = self.config;
        config.validate()?;

        let layout = TierLayout::new(&config.storage.root);
        layout.ensure_dirs().await?;

        let offload = match self.offload {
            Some(offload) => Some(offload),
            None => match (&config.offload.directory, config.offload.enabled) {
                (Some(dir), true) => {
                    let target = LocalDirOffload::open(dir).await?;
                    Some(Arc::new(target) as Arc<dyn OffloadTarget>)
                }
                _ => None,
            },
        };

        let engine = CoefficientEngine::new(config.overcommit.clone());
        let initial = engine.compute(CoefficientInputs::default());
        let ledger = CapacityLedger::new(
            config.storage.physical_limit,
            initial.coefficient,
            config.overcommit.min_coefficient,
            config.overcommit.max_coefficient,
        );

        info!(
            "Storage manager at {} ready: physical limit {} bytes, coefficient {:.3}, offload {}",
            layout.root().display(),
            config.storage.physical_limit,
            ledger.coefficient(),
            offload.as_ref().map_or("disabled", |o| o.name())
        );

        Ok(StorageManager {
            layout,
            policy: TierPolicy::new(config.tiering.clone()),
            engine,
            table: Mutex::new(FileTable::new(ledger)),
            cache: ReadCache::new(&config.cache),
            advisor: self
                .advisor
                .unwrap_or_else(|| Arc::new(EntropyAdvisor::new())),
            scorer: self
                .scorer
                .unwrap_or_else(|| Arc::new(FrequencyScorer::default())),
            offload,
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(RecorderSink::new())),
            offload_timeout: self
                .offload_timeout
                .unwrap_or_else(|| config.offload.timeout()),
            config,
        })
    }
}

/// Oversubscribed tiered storage manager
pub struct StorageManager {
    config: Config,
    layout: TierLayout,
    policy: TierPolicy,
    engine: CoefficientEngine,
    table: Mutex<FileTable>,
    cache: ReadCache,
    advisor: Arc<dyn CompressionAdvisor>,
    scorer: Arc<dyn PriorityScorer>,
    offload: Option<Arc<dyn OffloadTarget>>,
    metrics: Arc<dyn MetricsSink>,
    offload_timeout: Duration,
}

impl StorageManager {
    pub const fn builder(config: Config) -> StorageManagerBuilder {
        StorageManagerBuilder::new(config)
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn layout(&self) -> &TierLayout {
        &self.layout
    }

    /// Spawn the recompute, rebalance and trim loops
    pub fn start(self: &Arc<Self>) -> BackgroundTasks {
        BackgroundTasks::spawn(Arc::clone(self))
    }

    // ---- public I/O surface ----

    /// Create an empty file of `size` virtual bytes in the hot tier
    ///
    /// When the virtual limit is too small the coefficient is grown by one
    /// step and the reservation retried once.
    pub async fn create(&self, path: &str, size: u64) -> Result<()> {
        validate_path(path)?;
        let mut table = self.table.lock().await;
        if table.contains(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }

        if !table.ledger().can_reserve_virtual(size) {
            let current = table.ledger().coefficient();
            let grown = self.engine.grown(current);
            if grown > current {
                let applied = table.ledger_mut().set_coefficient(grown);
                info!(
                    "Grew overcommit coefficient {:.3} -> {:.3} to admit {} ({} bytes)",
                    current, applied, path, size
                );
                self.record_capacity(&table.quota());
            }
        }

        let physical_path = self.layout.physical_path(path, Tier::Hot);
        table.insert(VirtualFile::new(path.to_string(), physical_path, size))?;
        debug!("Created {} ({} virtual bytes)", path, size);
        Ok(())
    }

    /// Replace a file's contents
    ///
    /// Fails with `InsufficientPhysicalSpace` when the bytes do not fit even
    /// after a synchronous rebalance pass; callers should retry later.
    pub async fn write(&self, path: &str, data: impl Into<Bytes>) -> Result<()> {
        let data: Bytes = data.into();
        let len = data.len() as u64;
        let mut table = self.table.lock().await;

        let file = table.require(path)?;
        if len > file.virtual_size {
            return Err(Error::ExceedsVirtualSize {
                path: path.to_string(),
                length: len,
                virtual_size: file.virtual_size,
            });
        }

        let mut needed = len.saturating_sub(file.resident_bytes());
        if !table.ledger().has_physical(needed) {
            warn!(
                "Write of {} bytes to {} needs {} more physical bytes, rebalancing",
                len,
                path,
                needed
            );
            let report = self.rebalance_locked(&mut table).await;
            self.record_rebalance(&table, &report);
            // The pass may have offloaded this very file.
            needed = len.saturating_sub(table.require(path)?.resident_bytes());
            table.ledger().check_physical(needed)?;
        }

        let file = table.require(path)?;
        let physical_path = file.physical_path.clone();
        let old_resident = file.resident_bytes();
        let stale_remote = file.remote_location.clone();

        tokio::fs::write(&physical_path, &data).await?;
        if let Some(location) = stale_remote {
            self.delete_remote(path, &location).await;
        }

        let is_encrypted = self.advisor.is_encrypted(path);
        let reduction = if is_encrypted {
            0.0
        } else {
            self.advisor.estimate_reduction(&data).clamp(0.0, 1.0)
        };

        let ledger = table.ledger_mut();
        ledger.release_physical(old_resident);
        ledger.charge_physical(len);

        let now = Utc::now();
        let file = table.require_mut(path)?;
        file.physical_size = len;
        file.resident = true;
        file.remote_location = None;
        file.is_encrypted = is_encrypted;
        file.estimated_reduction = reduction;
        file.is_compressed = reduction >= COMPRESSIBLE_THRESHOLD;
        self.touch(file, now);

        self.cache.invalidate(path);
        debug!("Wrote {} bytes to {}", len, path);
        Ok(())
    }

    /// Read a file's contents, bounding remote retrieval by the configured
    /// offload timeout
    pub async fn read(&self, path: &str) -> Result<Bytes> {
        self.read_with_timeout(path, self.offload_timeout).await
    }

    /// Read a file's contents
    ///
    /// Offloaded files are downloaded (one retry, each attempt bounded by
    /// `timeout`) and rehydrated locally when physical space allows. A failed
    /// retrieval leaves the file untouched.
    pub async fn read_with_timeout(&self, path: &str, timeout: Duration) -> Result<Bytes> {
        let mut table = self.table.lock().await;
        let file = table.require(path)?;
        let physical_path = file.physical_path.clone();
        let physical_size = file.physical_size;
        let resident = file.resident;
        let remote_location = file.remote_location.clone();

        let cached = self.cache.get(path);
        let hit = cached.is_some();
        let data = if let Some(data) = cached {
            data
        } else if resident {
            let data = match tokio::fs::read(&physical_path).await {
                Ok(data) => Bytes::from(data),
                Err(e) => return Err(missing_as_corrupt(path, e)),
            };
            if data.len() as u64 != physical_size {
                return Err(Error::Corrupt(format!(
                    "{path}: expected {physical_size} bytes, found {}",
                    data.len()
                )));
            }
            data
        } else if let Some(location) = remote_location {
            let data = self.download(path, &location, timeout).await?;
            self.rehydrate(&mut table, path, &data).await;
            data
        } else {
            Bytes::new()
        };

        let now = Utc::now();
        let file = table.require_mut(path)?;
        self.touch(file, now);
        let priority = file.priority_score;

        if !hit
            && self.cache.is_eligible(priority, data.len() as u64)
            && self.cache.insert(path, data.clone())
        {
            debug!("Cached {} ({} bytes, priority {:.2})", path, data.len(), priority);
        }
        Ok(data)
    }

    /// Delete a file, its cached contents and any remote copy
    pub async fn delete(&self, path: &str) -> Result<()> {
        let mut table = self.table.lock().await;
        let physical_path = table.require(path)?.physical_path.clone();

        match tokio::fs::remove_file(&physical_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = table.remove(path)?;
        self.cache.invalidate(path);
        if let Some(location) = &file.remote_location {
            self.delete_remote(path, location).await;
        }
        debug!("Deleted {}", path);
        Ok(())
    }

    /// Rename a file, keeping its tier and remote copy
    pub async fn move_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        validate_path(new_path)?;
        let mut table = self.table.lock().await;
        let file = table.require(old_path)?;
        if old_path == new_path {
            return Ok(());
        }
        if table.contains(new_path) {
            return Err(Error::AlreadyExists(new_path.to_string()));
        }

        let from = file.physical_path.clone();
        let to = self.layout.physical_path(new_path, file.tier);
        if file.resident {
            placement::relocate(&from, &to)
                .await
                .map_err(|e| missing_as_corrupt(old_path, e))?;
        }

        table.rekey(old_path, new_path)?.physical_path = to;
        self.cache.invalidate(old_path);
        debug!("Moved {} to {}", old_path, new_path);
        Ok(())
    }

    /// Place a file in `tier` immediately
    pub async fn set_tier(&self, path: &str, tier: Tier) -> Result<()> {
        let mut table = self.table.lock().await;
        self.place_locked(&mut table, path, tier).await?;
        Ok(())
    }

    // ---- background passes ----

    /// Move every file to its predicted tier and release the local bytes of
    /// frozen files once their offload is confirmed
    pub async fn rebalance(&self) -> RebalanceReport {
        let mut table = self.table.lock().await;
        let report = self.rebalance_locked(&mut table).await;
        self.record_rebalance(&table, &report);
        drop(table);

        if report.failures > 0 {
            warn!(
                "Rebalance: {} of {} files failed to move or offload",
                report.failures, report.scanned
            );
        }
        if report.moved > 0 || report.offloaded > 0 {
            info!(
                "Rebalance: moved {} files, offloaded {} files ({} bytes released)",
                report.moved, report.offloaded, report.offloaded_bytes
            );
        }
        report
    }

    /// Recompute the overcommit coefficient and derive the virtual limit
    ///
    /// A limit that drops below current usage is applied anyway; existing
    /// files stay and new creates fail until usage falls under the limit.
    pub async fn recompute_coefficient(&self) -> CoefficientBreakdown {
        let mut table = self.table.lock().await;
        let breakdown = self.engine.compute(CoefficientInputs::from_files(table.files()));
        table.ledger_mut().set_coefficient(breakdown.coefficient);
        let quota = table.quota();
        drop(table);

        info!(
            "Overcommit coefficient {:.3} (candidate {:.3}), virtual limit {} bytes",
            breakdown.coefficient, breakdown.candidate, quota.virtual_limit
        );
        if quota.virtual_used > quota.virtual_limit {
            warn!(
                "Virtual limit {} is below usage {}; new files are refused until usage drops",
                quota.virtual_limit, quota.virtual_used
            );
        }
        self.record_capacity(&quota);
        breakdown
    }

    /// Grow the coefficient by `factor`, capped at the maximum
    ///
    /// Returns true if the virtual limit increased.
    pub async fn expand_virtual_space(&self, factor: f64) -> Result<bool> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(Error::configuration(format!(
                "expansion factor {factor} must be a positive number"
            )));
        }
        let mut table = self.table.lock().await;
        let before = table.quota().virtual_limit;
        let current = table.ledger().coefficient();
        let applied = table.ledger_mut().set_coefficient(current * factor);
        let quota = table.quota();
        drop(table);

        info!(
            "Expanded overcommit coefficient {:.3} -> {:.3}, virtual limit {} bytes",
            current, applied, quota.virtual_limit
        );
        self.record_capacity(&quota);
        Ok(quota.virtual_limit > before)
    }

    /// Evict least recently used cache entries until the budget holds
    pub fn trim_cache(&self) -> TrimReport {
        let report = self.cache.trim();
        if report.evicted > 0 {
            debug!(
                "Cache trim evicted {} entries ({} bytes)",
                report.evicted, report.freed_bytes
            );
        }
        self.metrics
            .record("cache_bytes", to_f64(report.used_bytes), "bytes", "cache");
        self.metrics
            .record("cache_evictions", to_f64(report.evicted as u64), "count", "cache");
        report
    }

    /// Change the cache budget; the next trim enforces it
    pub fn resize_cache(&self, budget_bytes: u64) {
        info!("Read cache budget set to {} bytes", budget_bytes);
        self.cache.resize(budget_bytes);
    }

    // ---- accessors ----

    /// Advertised capacity
    pub async fn virtual_total(&self) -> u64 {
        self.quota().await.virtual_limit
    }

    pub async fn virtual_used(&self) -> u64 {
        self.quota().await.virtual_used
    }

    /// Advertised capacity not yet reserved (0 when over the limit)
    pub async fn virtual_free(&self) -> u64 {
        self.quota().await.virtual_available()
    }

    pub async fn physical_used(&self) -> u64 {
        self.quota().await.physical_used
    }

    pub async fn physical_limit(&self) -> u64 {
        self.quota().await.physical_limit
    }

    pub async fn overcommit_coefficient(&self) -> f64 {
        self.quota().await.overcommit_coefficient
    }

    /// Snapshot of the capacity ledger
    pub async fn quota(&self) -> StorageQuota {
        self.table.lock().await.quota()
    }

    /// Metadata snapshot of one file
    pub async fn file_info(&self, path: &str) -> Result<VirtualFile> {
        let table = self.table.lock().await;
        let mut file = table.require(path)?.clone();
        file.is_cached = self.cache.contains(path);
        Ok(file)
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.table.lock().await.contains(path)
    }

    /// Virtual paths starting with `prefix`, sorted
    pub async fn list(&self, prefix: &str) -> Vec<String> {
        self.table.lock().await.paths_with_prefix(prefix)
    }

    /// Size-weighted estimated reduction over compressed files
    pub async fn compression_efficiency(&self) -> f64 {
        coefficient::compression_efficiency(self.table.lock().await.files())
    }

    /// Bytes held only by the offload target
    pub async fn offloaded_bytes(&self) -> u64 {
        coefficient::offloaded_bytes(self.table.lock().await.files())
    }

    /// Number of files in each tier, hottest first
    pub async fn tier_counts(&self) -> [(Tier, usize); 4] {
        let counts = self.table.lock().await.tier_counts();
        Tier::ALL.map(|tier| (tier, counts[tier.index()]))
    }

    /// Cache statistics; also reports the hit ratio
    pub fn cache_stats(&self) -> CacheStats {
        let stats = self.cache.stats();
        self.metrics
            .record("cache_hit_ratio", stats.hit_ratio(), "ratio", "cache");
        stats
    }

    // ---- internals ----

    /// Record an access and rescore the file
    fn touch(&self, file: &mut VirtualFile, now: DateTime<Utc>) {
        file.last_access = now;
        file.history.record(now);
        file.priority_score = self
            .scorer
            .score(&file.virtual_path, &file.history)
            .clamp(0.0, MAX_PRIORITY);
    }

    async fn rebalance_locked(&self, table: &mut FileTable) -> RebalanceReport {
        let now = Utc::now();
        let mut plan: Vec<(String, Tier)> = table
            .files()
            .map(|f| {
                let tier = self.policy.predict(f.last_access, f.priority_score, now);
                (f.virtual_path.clone(), tier)
            })
            .collect();
        plan.sort_unstable();

        let mut report = RebalanceReport {
            scanned: plan.len(),
            ..RebalanceReport::default()
        };
        let mut remote_down = false;
        for (path, tier) in plan {
            match self.place_locked(table, &path, tier).await {
                Ok(true) => report.moved += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to move {} to {}: {}", path, tier, e);
                    report.failures += 1;
                    continue;
                }
            }
            if tier != Tier::Frozen {
                continue;
            }
            if remote_down {
                // Frozen bytes still held locally count as failures.
                if table.get(&path).is_some_and(|f| f.resident && f.physical_size > 0) {
                    report.failures += 1;
                }
                continue;
            }
            match self.offload_locked(table, &path).await {
                Ok(Some(released)) => {
                    report.offloaded += 1;
                    report.offloaded_bytes += released;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to offload {}: {}", path, e);
                    report.failures += 1;
                    if matches!(e, Error::RemoteUnavailable(_)) {
                        warn!("Offload target unavailable, skipping offload for the rest of this pass");
                        remote_down = true;
                    }
                }
            }
        }
        report
    }

    /// Move a file's bytes into `tier`. Returns false if already there.
    async fn place_locked(&self, table: &mut FileTable, path: &str, tier: Tier) -> Result<bool> {
        let file = table.require(path)?;
        if file.tier == tier {
            return Ok(false);
        }
        let from_tier = file.tier;
        let from = file.physical_path.clone();
        let to = self.layout.physical_path(path, tier);
        if file.resident {
            placement::relocate(&from, &to)
                .await
                .map_err(|e| missing_as_corrupt(path, e))?;
        }

        let file = table.require_mut(path)?;
        file.tier = tier;
        file.physical_path = to;
        debug!("Moved {} from {} to {}", path, from_tier, tier);
        Ok(true)
    }

    /// Offload a resident file and release its local bytes. Returns the
    /// bytes released, or `None` when there is nothing to do.
    async fn offload_locked(&self, table: &mut FileTable, path: &str) -> Result<Option<u64>> {
        let Some(target) = &self.offload else {
            return Ok(None);
        };
        let file = table.require(path)?;
        if !file.resident || file.physical_size == 0 {
            return Ok(None);
        }
        let physical_path = file.physical_path.clone();
        let size = file.physical_size;
        let existing = file.remote_location.clone();
        let timeout = self.offload_timeout;

        let confirmed = match existing {
            Some(location) => {
                let present = with_timeout(timeout, target.exists(&location))
                    .await
                    .map_err(|e| remote_error(path, "check", e))?;
                if present {
                    Some(location)
                } else {
                    self.delete_remote(path, &location).await;
                    table.require_mut(path)?.remote_location = None;
                    None
                }
            }
            None => None,
        };
        let location = if let Some(location) = confirmed {
            location
        } else {
            let data = tokio::fs::read(&physical_path)
                .await
                .map_err(|e| missing_as_corrupt(path, e))?;
            let location = with_timeout(timeout, target.upload(path, Bytes::from(data)))
                .await
                .map_err(|e| remote_error(path, "upload", e))?;
            // Unconfirmed uploads are kept on the file so the next pass checks
            // this location instead of uploading again.
            let stored = with_timeout(timeout, target.exists(&location)).await;
            match stored {
                Ok(true) => location,
                Ok(false) => {
                    table.require_mut(path)?.remote_location = Some(location);
                    return Err(Error::remote(format!(
                        "{} did not confirm upload of {path}",
                        target.name()
                    )));
                }
                Err(e) => {
                    table.require_mut(path)?.remote_location = Some(location);
                    return Err(remote_error(path, "confirm", e));
                }
            }
        };

        if let Err(e) = tokio::fs::remove_file(&physical_path).await
            && e.kind() != io::ErrorKind::NotFound
        {
            // Remote copy is good; the next pass only needs to drop the bytes.
            table.require_mut(path)?.remote_location = Some(location);
            return Err(e.into());
        }

        table.ledger_mut().release_physical(size);
        let file = table.require_mut(path)?;
        file.resident = false;
        debug!("Offloaded {} ({} bytes) to {} at {}", path, size, target.name(), location);
        file.remote_location = Some(location);
        Ok(Some(size))
    }

    async fn download(&self, path: &str, location: &str, timeout: Duration) -> Result<Bytes> {
        let Some(target) = &self.offload else {
            return Err(Error::remote(format!(
                "{path} is offloaded but no offload target is configured"
            )));
        };

        let mut last_error = None;
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match with_timeout(timeout, target.download(location)).await {
                Ok(data) => return Ok(data),
                Err(OffloadError::Corrupt(msg)) => {
                    return Err(Error::Corrupt(format!("{path}: {msg}")));
                }
                Err(e) => {
                    warn!(
                        "Download of {} from {} failed (attempt {}/{}): {}",
                        path,
                        target.name(),
                        attempt,
                        DOWNLOAD_ATTEMPTS,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(Error::remote(format!(
            "download of {path} from {} failed: {}",
            target.name(),
            last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string())
        )))
    }

    /// Restore downloaded bytes locally if the medium has room
    async fn rehydrate(&self, table: &mut FileTable, path: &str, data: &Bytes) {
        let len = data.len() as u64;
        if !table.ledger().has_physical(len) {
            debug!("Serving {} without rehydration: no physical space", path);
            return;
        }
        let Some(file) = table.get(path) else {
            return;
        };
        if let Err(e) = tokio::fs::write(&file.physical_path, data).await {
            warn!("Failed to rehydrate {}: {}", path, e);
            return;
        }
        table.ledger_mut().charge_physical(len);
        if let Some(file) = table.get_mut(path) {
            file.physical_size = len;
            file.resident = true;
        }
        debug!("Rehydrated {} ({} bytes)", path, len);
    }

    /// Best-effort removal of a remote copy
    async fn delete_remote(&self, path: &str, location: &str) {
        let Some(target) = &self.offload else {
            warn!("Cannot delete remote copy of {}: no offload target", path);
            return;
        };
        match with_timeout(self.offload_timeout, target.delete(location)).await {
            Ok(()) | Err(OffloadError::NotFound(_)) => {
                debug!("Deleted remote copy of {} at {}", path, location);
            }
            Err(e) => warn!("Failed to delete remote copy of {} at {}: {}", path, location, e),
        }
    }

    fn record_capacity(&self, quota: &StorageQuota) {
        let m = &self.metrics;
        m.record("overcommit_coefficient", quota.overcommit_coefficient, "ratio", "capacity");
        m.record("virtual_limit_bytes", to_f64(quota.virtual_limit), "bytes", "capacity");
        m.record("virtual_used_bytes", to_f64(quota.virtual_used), "bytes", "capacity");
        m.record("physical_used_bytes", to_f64(quota.physical_used), "bytes", "capacity");
    }

    fn record_rebalance(&self, table: &FileTable, report: &RebalanceReport) {
        let m = &self.metrics;
        m.record("tier_moves", to_f64(report.moved as u64), "count", "tiering");
        m.record("offloaded_files", to_f64(report.offloaded as u64), "count", "tiering");
        m.record(
            "offloaded_bytes",
            to_f64(coefficient::offloaded_bytes(table.files())),
            "bytes",
            "tiering",
        );
        m.record(
            "physical_used_bytes",
            to_f64(table.quota().physical_used),
            "bytes",
            "capacity",
        );
    }
}

/// Missing local bytes for a file that claims them are corruption
fn missing_as_corrupt(path: &str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::Corrupt(format!("{path}: physical bytes missing"))
    } else {
        e.into()
    }
}

fn remote_error(path: &str, op: &str, e: OffloadError) -> Error {
    match e {
        OffloadError::Corrupt(msg) => Error::Corrupt(format!("{path}: {msg}")),
        other => Error::remote(format!("{op} of {path}: {other}")),
    }
}
