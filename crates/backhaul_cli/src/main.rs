//! Backhaul daemon: wires the configuration store, scheduler, notification
//! dispatcher, and storage alert monitor behind the job-trigger HTTP API
//! (spec §6).

mod alert_loop;
mod api;
mod auth;
mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use backhaul_alerts::AlertThresholds;
use backhaul_logging::LogConfig;
use backhaul_notify::{BufferingNotificationLog, Dispatcher, HttpNotifySink};
use backhaul_protocol::config::{Settings, MASTER_KEY_ENV};
use backhaul_protocol::{Channel, ChannelId, ExecutionRepository, JobRepository};
use backhaul_scheduler::{Scheduler, SchedulerConfig};
use backhaul_security::SecretStore;
use backhaul_store::{connect, Store, StoreConfig};

use crate::alert_loop::{InMemoryAlertStateRepository, InMemorySnapshotRepository};
use crate::auth::ApiKeyConfig;
use crate::rate_limit::RateLimiterState;

const DEFAULT_ALERT_LOOP_SECS: u64 = 900;
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Parser, Debug)]
#[command(name = "backhaul", about = "Self-hosted database backup orchestrator")]
struct Cli {
    /// Enable verbose (debug) logging to stderr in addition to the file log.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the job-trigger HTTP API, cron scheduler, and storage alert
    /// loop until terminated.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    backhaul_logging::init_logging(LogConfig {
        app_name: "backhaul",
        verbose: cli.verbose,
    })
    .context("failed to initialize logging")?;

    match cli.command {
        Commands::Serve => serve().await,
    }
}

async fn serve() -> Result<()> {
    let settings = Settings::from_env().context("failed to load settings")?;

    let master_key_hex = env::var(MASTER_KEY_ENV)
        .with_context(|| format!("{MASTER_KEY_ENV} must be set to a 64-hex-character master key"))?;
    let secret_store = Arc::new(
        SecretStore::from_hex(&master_key_hex).context("invalid master key")?,
    );

    let pool = connect(StoreConfig {
        url: settings.store_url.clone(),
        max_connections: 5,
    })
    .await
    .context("failed to open the configuration store")?;
    let store = Arc::new(Store::new(pool));
    let job_repo: Arc<dyn JobRepository> = store.clone();
    let execution_repo: Arc<dyn ExecutionRepository> = store.clone();

    let dispatcher = Arc::new(Dispatcher::new(
        job_repo.clone(),
        secret_store.clone(),
        Arc::new(HttpNotifySink::new()),
        Arc::new(BufferingNotificationLog::default()),
    ));
    // Shared with the alert loop below so a backup's own finalize-time
    // refresh (spec §4.5 step 7) and the alert loop's periodic probe feed
    // the same snapshot history rather than keeping two.
    let snapshots: Arc<InMemorySnapshotRepository> = Arc::new(InMemorySnapshotRepository::default());

    let scheduler = Scheduler::new(
        job_repo.clone(),
        execution_repo.clone(),
        secret_store.clone(),
        dispatcher.clone(),
        snapshots.clone(),
        SchedulerConfig {
            concurrency: settings.max_concurrent_runs,
            ..SchedulerConfig::default()
        },
    );
    scheduler.reload().await.context("failed to load the cron table")?;
    let _ticker = scheduler.spawn_ticker();

    let alert_channels = load_alert_channels(job_repo.as_ref()).await?;
    let alert_thresholds = AlertThresholds {
        spike_percent: env_f64("BACKHAUL_ALERT_SPIKE_PERCENT"),
        storage_limit_bytes: env_u64("BACKHAUL_ALERT_STORAGE_LIMIT_BYTES"),
        missing_backup_hours: env_i64("BACKHAUL_ALERT_MISSING_BACKUP_HOURS"),
    };
    let alert_loop_period = Duration::from_secs(
        env_u64("BACKHAUL_ALERT_LOOP_SECS").unwrap_or(DEFAULT_ALERT_LOOP_SECS),
    );
    let _alert_task = alert_loop::spawn(
        job_repo.clone(),
        secret_store.clone(),
        snapshots,
        Arc::new(InMemoryAlertStateRepository::default()),
        dispatcher,
        alert_channels,
        alert_thresholds,
        alert_loop_period,
    );

    let api_keys = env::var("BACKHAUL_API_KEYS").unwrap_or_default();
    let api_key_config = ApiKeyConfig::from_env_str(&api_keys)
        .map_err(|err| anyhow::anyhow!("invalid BACKHAUL_API_KEYS: {err}"))?;
    let rate_limiter = RateLimiterState::new(
        env_u64("BACKHAUL_RATE_LIMIT_REQUESTS")
            .map(|value| value as u32)
            .unwrap_or(DEFAULT_RATE_LIMIT_REQUESTS),
        Duration::from_secs(
            env_u64("BACKHAUL_RATE_LIMIT_WINDOW_SECS").unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        ),
    );

    let state = api::AppState {
        execution_repo,
        scheduler,
    };

    let app = api::router()
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            rate_limit::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            api_key_config,
            auth::auth_middleware,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "job-trigger API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("job-trigger API server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received shutdown signal, draining in-flight requests");
}

/// Resolves the global notification channel list (spec §4.8 "system-scoped
/// events use the global channel list") from `BACKHAUL_ALERT_CHANNELS`, a
/// comma-separated list of channel ids.
async fn load_alert_channels(job_repo: &dyn JobRepository) -> Result<Vec<Channel>> {
    let raw = env::var("BACKHAUL_ALERT_CHANNELS").unwrap_or_default();
    let ids: Vec<ChannelId> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().context("invalid channel id in BACKHAUL_ALERT_CHANNELS"))
        .collect::<Result<_>>()?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(job_repo.get_channels(&ids).await?)
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

fn env_i64(name: &str) -> Option<i64> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

fn env_f64(name: &str) -> Option<f64> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}
