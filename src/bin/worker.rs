//! Worker process entry point.
//!
//! Bootstrap order: init tracing, load config, connect the store (which
//! runs migrations), seed the registry, then run until a shutdown signal
//! arrives.

use std::sync::Arc;

use gist_queue::config::Config;
use gist_queue::registry;
use gist_queue::router::Router;
use gist_queue::store::Store;
use gist_queue::upstream::HttpUpstream;
use gist_queue::worker::{Worker, WorkerConfig};
use gist_queue::{callback::CallbackConfig, content::PlainTextExtractor};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;

    let store = Arc::new(Store::connect(&config.database_url, config.max_connections).await?);
    registry::seed(&store, &config).await?;

    let upstream = Arc::new(HttpUpstream::new(config.upstream_base_url.clone()));
    let router = Arc::new(Router::new(Arc::clone(&store), upstream));

    let worker_config = WorkerConfig {
        worker_id: WorkerConfig::generate_worker_id(),
        concurrency: config.worker_concurrency,
        poll_interval: config.poll_interval,
        housekeeping_interval: std::time::Duration::from_secs(5 * 60),
        stale_timeout: chrono::Duration::minutes(config.stale_timeout_min),
    };

    let callback_config = CallbackConfig {
        url: config.callback_url.clone(),
        secret: config.internal_secret.clone(),
    };

    let worker = Arc::new(Worker::new(
        worker_config,
        Arc::clone(&store),
        router,
        Arc::new(PlainTextExtractor),
        callback_config,
    ));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining");
        shutdown_signal.cancel();
    });

    worker.run_until_shutdown(shutdown).await;
    Ok(())
}
