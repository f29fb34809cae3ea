//! urlcheckd — the urlcheck probe daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - HTTP prober
//! - Check scheduler (election, probing, reconciliation)
//! - Retention sweeper
//!
//! # Usage
//!
//! ```text
//! urlcheckd run --config /etc/urlcheck/urlcheckd.toml --probe-name eu-1 --clustered
//! urlcheckd sweep --config /etc/urlcheck/urlcheckd.toml
//! urlcheckd list --config /etc/urlcheck/urlcheckd.toml
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use urlcheck_probe::HttpProber;
use urlcheck_scheduler::{CheckScheduler, RetentionSweeper};
use urlcheck_state::{RetentionPolicy, StateStore, epoch_secs};

use crate::config::{DaemonConfig, Settings};

const DEFAULT_LOG_FILTER: &str = "info,urlcheckd=debug,urlcheck=debug";
const STORE_FILE_NAME: &str = "urlcheck.redb";

#[derive(Parser)]
#[command(name = "urlcheckd", about = "urlcheck probe daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and retention sweeper until interrupted.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Probe name recorded on claims and results.
        #[arg(long)]
        probe_name: Option<String>,

        /// Share the store with other probes.
        #[arg(long)]
        clustered: bool,

        /// Checks claimed per tick.
        #[arg(long)]
        pool_size: Option<usize>,

        /// Directory holding the store file.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Expire old results once and exit.
    Sweep {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Results deleted per batch.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print every check with its current status.
    List {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Run {
            config,
            probe_name,
            clustered,
            pool_size,
            data_dir,
        } => {
            let mut config = DaemonConfig::load(config.as_deref())?;
            if probe_name.is_some() {
                config.probe.name = probe_name;
            }
            if clustered {
                config.probe.clustered = Some(true);
            }
            if pool_size.is_some() {
                config.probe.candidate_pool_size = pool_size;
            }
            if let Some(dir) = data_dir {
                config.store.path = Some(dir.join(STORE_FILE_NAME));
            }
            run(config.resolve()?).await
        }
        Command::Sweep { config, limit } => {
            let mut config = DaemonConfig::load(config.as_deref())?;
            if limit.is_some() {
                config.retention.expiry_limit = limit;
            }
            sweep(config.resolve()?)
        }
        Command::List { config } => list(DaemonConfig::load(config.as_deref())?.resolve()?),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(path: &Path) -> anyhow::Result<StateStore> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = StateStore::open(path)?;
    info!(path = ?path, "state store opened");
    Ok(store)
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    info!(probe = %settings.scheduler.probe, "urlcheck daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let state = open_store(&settings.store_path)?;
    let prober = HttpProber::new(settings.probe_timeout)?;

    let scheduler = CheckScheduler::new(
        settings.scheduler.clone(),
        Arc::new(state.clone()),
        Arc::new(state.clone()),
        Arc::new(prober),
    )?;
    let sweeper = RetentionSweeper::new(Arc::new(state));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_shutdown = shutdown_rx.clone();

    // ── Start background tasks ─────────────────────────────────

    let tick_interval = settings.tick_interval;
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(tick_interval, shutdown_rx).await;
    });

    let (sweep_interval, expiry_limit) = (settings.sweep_interval, settings.expiry_limit);
    let sweeper_handle = tokio::spawn(async move {
        sweeper
            .run(sweep_interval, expiry_limit, sweep_shutdown)
            .await;
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Wait for background tasks.
    let _ = scheduler_handle.await;
    let _ = sweeper_handle.await;

    info!("urlcheck daemon stopped");
    Ok(())
}

fn sweep(settings: Settings) -> anyhow::Result<()> {
    let state = open_store(&settings.store_path)?;
    let sweeper = RetentionSweeper::new(Arc::new(state));
    let expired = sweeper.drain(settings.expiry_limit, epoch_secs())?;
    println!("expired {expired} results");
    Ok(())
}

fn list(settings: Settings) -> anyhow::Result<()> {
    let state = open_store(&settings.store_path)?;
    let checks = state.list_checks()?;

    println!(
        "{:>6}  {:<24}  {:<7}  {:<7}  {:>10}  {:<12}  {:>9}  URL",
        "ID", "NAME", "STATUS", "STATE", "REFRESH", "PROBE", "RETENTION"
    );
    for check in &checks {
        let retention = match state.max_retention(check.user_id)? {
            Some(secs) => format!("{secs}s"),
            None => "-".to_string(),
        };
        println!(
            "{:>6}  {:<24}  {:<7}  {:<7}  {:>10}  {:<12}  {:>9}  {}",
            check.id,
            check.name,
            check.status.to_string(),
            check.state.to_string(),
            check.refresh,
            check.probe.as_deref().unwrap_or("-"),
            retention,
            check.url,
        );
    }
    println!("{} checks", checks.len());
    Ok(())
}
