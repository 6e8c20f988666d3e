//! genatlas-ac (Annotation Curation) service binary

use anyhow::Result;
use clap::Parser;
use genatlas_ac::tasks::cache::spawn_sweeper;
use genatlas_ac::tasks::providers::{PollPolicy, ProviderSet};
use genatlas_ac::tasks::queue::WorkerQueue;
use genatlas_ac::{build_router, AppState};
use genatlas_common::config::ServiceConfig;
use genatlas_common::db::init_database;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "genatlas-ac", about = "GeneAtlas annotation curation service")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long, env = "GENATLAS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting GeneAtlas Annotation Curation (genatlas-ac) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();
    let config = ServiceConfig::load(args.config.as_deref())?;

    let pool = init_database(&config.database_path).await?;

    let providers = Arc::new(ProviderSet::from_config(&config));
    let policy = PollPolicy {
        interval: Duration::from_secs(config.poll_interval_secs),
        max_attempts: config.poll_max_attempts,
    };
    let queue = Arc::new(WorkerQueue::new(pool.clone(), providers, policy));

    let state = AppState::new(pool, queue, config.task_retention_hours);

    // Hourly by default; the cache also sweeps at each lookup
    spawn_sweeper(
        state.cache.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("genatlas-ac listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
