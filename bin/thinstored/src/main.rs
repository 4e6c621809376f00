//! thinstore daemon
//!
//! Runs the oversubscribed tiered storage manager with its background
//! recompute, rebalance and trim loops until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thinstore_common::Config;
use thinstore_core::StorageManager;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "thinstored")]
#[command(about = "thinstore oversubscribed tiered storage daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/thinstore/thinstore.toml")]
    config: PathBuf,

    /// Storage root holding the tier directories
    #[arg(long, env = "THINSTORE_ROOT")]
    root: Option<PathBuf>,

    /// Physical capacity in bytes
    #[arg(long)]
    physical_limit: Option<u64>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_found = args.config.exists();
    let mut config = load_config(&args.config)?;

    // CLI takes precedence over the config file
    if let Some(root) = args.root {
        config.storage.root = root;
    }
    if let Some(limit) = args.physical_limit {
        config.storage.physical_limit = limit;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting thinstore daemon");
    if config_found {
        info!("Config file: {}", args.config.display());
    } else {
        warn!("Config file {} not found, using defaults", args.config.display());
    }

    if let Some(addr) = args.metrics_listen {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Metrics listening on {}", addr);
    }

    let manager = Arc::new(StorageManager::builder(config).build().await?);
    let quota = manager.quota().await;
    info!(
        "Advertising {} bytes over {} physical bytes (coefficient {:.3})",
        quota.virtual_limit, quota.physical_limit, quota.overcommit_coefficient
    );

    let tasks = manager.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    tasks.shutdown().await;
    info!("thinstore daemon stopped");
    Ok(())
}
