//! Exchange rate worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use fxrate_fetcher::XeScraper;
use fxrate_queue::{BeanstalkQueue, QueueClient};
use fxrate_store::RedisRateStore;
use fxrate_worker::{
    logging, metrics, shutdown, ConsumeSummary, Consumer, WorkerConfig, WorkerResult,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    logging::init_tracing();

    info!("Starting fxrate-worker");

    let config = WorkerConfig::from_env();
    info!(
        profile = %config.profile,
        queue = %config.queue.address(),
        tube = %config.queue.tube,
        store = %config.store.redacted_url(),
        "Worker config: {:?}",
        config.consume
    );

    if let Some(port) = config.metrics_port {
        metrics::install_exporter(port).context("Failed to install Prometheus exporter")?;
        info!("Serving metrics on port {}", port);
    }

    let store = RedisRateStore::connect(config.store.clone())
        .await
        .with_context(|| format!("Failed to connect to rate store {}", config.store.redacted_url()))?;
    let fetcher = XeScraper::new(config.fetcher.clone()).context("Failed to create rate fetcher")?;
    let queue: Arc<dyn QueueClient> = Arc::new(
        BeanstalkQueue::connect(config.queue.clone())
            .await
            .with_context(|| format!("Failed to connect to beanstalkd {}", config.queue.address()))?,
    );

    let (handle, shutdown) = shutdown::channel();
    let signals = tokio::spawn(async move {
        shutdown::wait_for_signal().await;
        info!("Shutting down after the current job");
        handle.trigger();
    });

    let consumer = Consumer::new(
        Arc::clone(&queue),
        Arc::new(fetcher),
        Arc::new(store),
        config.queue.tube.clone(),
        config.consume.clone(),
        shutdown,
    );

    let result = run(&consumer).await;

    signals.abort();
    if let Err(e) = queue.quit().await {
        warn!("Failed to close queue connection: {}", e);
    }

    match result {
        Ok(summary) => {
            info!(
                reserved = summary.reserved,
                stop_reason = ?summary.stop_reason,
                "Worker shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            error!("Worker error: {}", e);
            Err(e.into())
        }
    }
}

async fn run(consumer: &Consumer) -> WorkerResult<ConsumeSummary> {
    consumer.watch().await?;
    consumer.consume().await
}
