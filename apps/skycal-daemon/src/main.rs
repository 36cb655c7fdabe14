//! # SkyCal Daemon
//!
//! Periodically synchronizes every configured sub-resource with the remote
//! scheduler.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  load config ─► open SQLite (migrations) ─► build SyncEngine           │
//! │                                                  │                      │
//! │             ┌────────────────────────────────────┘                      │
//! │             ▼                                                           │
//! │  every interval_secs: run_sync_all(now)   (missed ticks are skipped)   │
//! │             │                                                           │
//! │  Ctrl-C / SIGTERM ─► finish current run ─► close pool ─► exit          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! skycal-daemon [--config <path>] [--once]
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use skycal_db::{Database, DbConfig};
use skycal_sync::{PassOutcome, SyncConfig, SyncEngine};

/// Periodic remote schedule sync for SkyCal.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SKYCAL_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single pass of every sub-resource and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting SkyCal sync daemon...");

    let config = SyncConfig::load(args.config).context("loading configuration")?;
    info!(
        database = %config.database.path.display(),
        interval_secs = config.sync.interval_secs,
        subresources = config.subresources.len(),
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let db = Database::new(
        DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
    )
    .await
    .context("opening database")?;

    let engine = SyncEngine::from_config(&config, &db).context("building sync engine")?;

    if args.once {
        let failed = run_once(&engine).await;
        db.close().await;
        if failed > 0 {
            bail!("{} sub-resource pass(es) failed", failed);
        }
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_once(&engine).await;
            }
            _ = &mut shutdown => break,
        }
    }

    db.close().await;
    info!("Daemon shutdown complete");
    Ok(())
}

/// Runs one pass of every sub-resource and returns the number that failed.
async fn run_once(engine: &SyncEngine) -> usize {
    let reports = engine.run_sync_all(Utc::now()).await;

    let failed = reports
        .iter()
        .filter(|r| matches!(r.outcome, PassOutcome::Failed { .. }))
        .count();
    let applied = reports
        .iter()
        .filter(|r| r.outcome == PassOutcome::Applied)
        .count();

    if failed > 0 {
        warn!(applied, failed, total = reports.len(), "Sync run finished with failures");
    } else {
        info!(applied, total = reports.len(), "Sync run finished");
    }
    failed
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping after the current run...");
}
