//! lifelined — the Lifeline daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - Instance registry behind the ingestion API
//! - Daily aggregation scheduler
//!
//! # Usage
//!
//! ```text
//! lifelined serve --config /etc/lifeline/lifeline.toml --port 8080
//! lifelined run-aggregation --data-dir /var/lib/lifeline
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use lifeline_aggregate::{AggregationEngine, DailyScheduler, Windows};
use lifeline_api::{ApiState, build_router};
use lifeline_core::config::StorageConfig;
use lifeline_core::{LifelineConfig, SharedClock, SystemClock};
use lifeline_state::{SharedRepository, StateStore, TelemetryRepository};

#[derive(Parser)]
#[command(name = "lifelined", about = "Lifeline telemetry daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion API and the daily aggregation scheduler.
    Serve {
        #[command(flatten)]
        common: CommonArgs,

        /// Address to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one aggregation now and exit.
    RunAggregation {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to lifeline.toml. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

impl CommonArgs {
    fn load(&self) -> anyhow::Result<LifelineConfig> {
        let mut config = match &self.config {
            Some(path) => LifelineConfig::from_file(path)?,
            None => LifelineConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve { common, host, port } => {
            let mut config = common.load()?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::RunAggregation { common } => run_aggregation(common.load()?).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,lifelined=debug,lifeline=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(storage: &StorageConfig) -> anyhow::Result<Arc<StateStore>> {
    std::fs::create_dir_all(&storage.data_dir)
        .with_context(|| format!("creating data dir {}", storage.data_dir.display()))?;
    let db_path = storage.db_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(Arc::new(store))
}

fn build_engine(
    config: &LifelineConfig,
    repo: SharedRepository,
    clock: SharedClock,
) -> anyhow::Result<AggregationEngine> {
    let windows = Windows {
        online: config.aggregation.online_window()?,
        active: config.aggregation.active_window()?,
    };
    Ok(AggregationEngine::new(repo, clock)
        .with_windows(windows)
        .with_timeout(config.aggregation.run_timeout()?))
}

async fn serve(config: LifelineConfig) -> anyhow::Result<()> {
    info!("Lifeline daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(&config.storage)?;
    let clock: SharedClock = Arc::new(SystemClock);

    let count = store.count_daily_metrics()?;
    match store.list_daily_metrics(1)?.first() {
        Some(latest) => info!(
            count,
            latest_at = latest.created_at,
            "daily metric snapshots on record"
        ),
        None => info!("no daily metric snapshots on record"),
    }

    let engine = build_engine(&config, store.clone(), clock.clone())?;
    let run_at = config.aggregation.run_at()?;
    let scheduler = DailyScheduler::new(engine, clock.clone(), run_at);
    info!(%run_at, "aggregation scheduler initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let state = ApiState::new(store, clock).with_attribute_limits(config.attributes);
    let router = build_router(state);
    let addr = (config.server.host.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}:{}", addr.0, addr.1))?;

    info!(addr = %listener.local_addr()?, "API server listening");

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = scheduler_handle.await;

    info!("Lifeline daemon stopped");
    Ok(())
}

async fn run_aggregation(config: LifelineConfig) -> anyhow::Result<()> {
    let store = open_store(&config.storage)?;
    let clock: SharedClock = Arc::new(SystemClock);
    let engine = build_engine(&config, store, clock)?;

    let report = tokio::task::spawn_blocking(move || engine.run()).await??;
    info!(
        created_at = report.metric.created_at,
        flipped_offline = report.flipped_offline.len(),
        "aggregation run finished"
    );
    Ok(())
}
