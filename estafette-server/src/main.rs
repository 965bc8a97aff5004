//! Automation service: queue workers plus the administration API.
//!
//! Picks the queue backend once at startup. With `ESTAFETTE_DATABASE_URL`
//! set, jobs live in SQLite and worker pools drain them; without it the
//! process still serves the API, but over the no-op queue.

mod adapters;
mod api;
mod config;
mod workers;

use anyhow::Context;
use config::ServerConfig;
use estafette::core::queue::Queue;
use estafette::core::{CancellationToken, Duration};
use estafette::prelude::{JobRunner, NullQueue};
use estafette_sqlite::{RetentionPolicy, SqliteQueue};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// How often the store housekeeping runs, and how long an active job may go
/// untouched before it counts as stalled.
const HOUSEKEEPING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const STALL_TIMEOUT_MINUTES: i64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    match config.store_url() {
        Some(url) => run_connected(url.to_string(), config.clone()).await,
        None => {
            tracing::warn!(
                "job store not configured, running disconnected; every submission becomes a no-op"
            );
            serve(Arc::new(NullQueue::new()), &config, CancellationToken::new()).await
        }
    }
}

async fn run_connected(url: String, config: ServerConfig) -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new()
        .connect(&url)
        .await
        .with_context(|| format!("Failed to open job store at {url}"))?;
    estafette_sqlite::MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run job store migrations")?;
    let queue = Arc::new(SqliteQueue::with_pool(pool));
    tracing::info!(%url, "job store ready");

    spawn_housekeeping(queue.clone());

    let channels = workers::Channels::log_only();
    let runner = JobRunner::new(
        queue.clone(),
        workers::runner_router(&channels),
        workers::worker_config(),
    );
    let shutdown = runner.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = runner.run(Duration::seconds(1)).await {
            tracing::error!("job runner stopped: {e}");
        }
    });

    serve(queue, &config, shutdown).await
}

/// Periodic retention sweep and stalled-job recovery.
fn spawn_housekeeping(queue: Arc<SqliteQueue>) {
    tokio::spawn(async move {
        let retention = RetentionPolicy::default();
        let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = queue
                .release_stalled(Duration::minutes(STALL_TIMEOUT_MINUTES))
                .await
            {
                tracing::error!("stalled-job recovery failed: {e}");
            }
            if let Err(e) = queue.sweep_retention(&retention).await {
                tracing::error!("retention sweep failed: {e}");
            }
        }
    });
}

async fn serve<Q>(
    queue: Arc<Q>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    Q: Queue + 'static,
{
    let app = api::router(api::AppState::new(queue));
    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;
    tracing::info!("administration API listening on http://{}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::error!("failed to listen for shutdown signal");
            }
            tracing::info!("shutting down, waiting for workers to wind down");
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
