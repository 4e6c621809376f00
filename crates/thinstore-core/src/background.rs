//! Supervised background loops
//!
//! Three periodic tasks keep the manager honest: coefficient recompute, tier
//! rebalance and cache trim. Each runs on its own tokio task, only touches
//! shared state through the manager's locks, and survives failed iterations.
//! [`BackgroundTasks::shutdown`] signals all of them and joins them.

use crate::manager::StorageManager;
use std::sync::Arc;
use std::time::Duration;
use thinstore_common::Config;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Periods of the three loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub recompute: Duration,
    pub rebalance: Duration,
    pub trim: Duration,
}

impl Intervals {
    pub const fn from_config(config: &Config) -> Self {
        Self {
            recompute: config.overcommit.recompute_interval(),
            rebalance: config.tiering.rebalance_interval(),
            trim: config.cache.trim_interval(),
        }
    }
}

/// Handle to the running loops
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    /// Spawn the loops with the periods from the manager's configuration
    pub fn spawn(manager: Arc<StorageManager>) -> Self {
        let intervals = Intervals::from_config(manager.config());
        Self::spawn_with(manager, intervals)
    }

    /// Spawn the loops with explicit periods
    pub fn spawn_with(manager: Arc<StorageManager>, intervals: Intervals) -> Self {
        let (shutdown, _) = watch::channel(false);
        let handles = vec![
            (
                "recompute",
                tokio::spawn(recompute_loop(
                    Arc::clone(&manager),
                    intervals.recompute,
                    shutdown.subscribe(),
                )),
            ),
            (
                "rebalance",
                tokio::spawn(rebalance_loop(
                    Arc::clone(&manager),
                    intervals.rebalance,
                    shutdown.subscribe(),
                )),
            ),
            (
                "trim",
                tokio::spawn(trim_loop(manager, intervals.trim, shutdown.subscribe())),
            ),
        ];
        info!(
            "Background loops started (recompute {:?}, rebalance {:?}, trim {:?})",
            intervals.recompute, intervals.rebalance, intervals.trim
        );
        Self { shutdown, handles }
    }

    /// Number of loops still running
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Signal every loop to stop and wait for all of them
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!("Background loop {} ended abnormally: {}", name, e);
            }
        }
        info!("Background loops stopped");
    }
}

/// Shortest period a loop will tick at
const MIN_PERIOD: Duration = Duration::from_millis(1);

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Wait for the next tick. Returns false once shutdown is signalled.
async fn next_tick(ticker: &mut tokio::time::Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = ticker.tick() => true,
        // A dropped sender also means stop.
        _ = shutdown.changed() => false,
    }
}

async fn recompute_loop(
    manager: Arc<StorageManager>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    // The first tick completes immediately; the builder already set the
    // initial coefficient.
    ticker.tick().await;
    while next_tick(&mut ticker, &mut shutdown).await {
        let breakdown = manager.recompute_coefficient().await;
        debug!("Recompute tick: coefficient {:.3}", breakdown.coefficient);
    }
    debug!("Recompute loop exiting");
}

async fn rebalance_loop(
    manager: Arc<StorageManager>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period);
    ticker.tick().await;
    while next_tick(&mut ticker, &mut shutdown).await {
        let report = manager.rebalance().await;
        if report.failures > 0 {
            error!(
                "Rebalance tick left {} files unplaced; retrying next tick",
                report.failures
            );
        }
    }
    debug!("Rebalance loop exiting");
}

async fn trim_loop(manager: Arc<StorageManager>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = ticker(period);
    ticker.tick().await;
    while next_tick(&mut ticker, &mut shutdown).await {
        let report = manager.trim_cache();
        debug!(
            "Trim tick: evicted {}, {} bytes cached",
            report.evicted, report.used_bytes
        );
    }
    debug!("Trim loop exiting");
}
