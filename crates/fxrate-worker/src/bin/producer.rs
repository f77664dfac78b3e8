//! Seeds one rate-fetch job for the configured currency pair.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use fxrate_models::JobId;
use fxrate_queue::{BeanstalkQueue, Producer, QueueClient, QueueResult};
use fxrate_worker::{logging, ProducerDefaults, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = WorkerConfig::from_env();
    info!(
        profile = %config.profile,
        queue = %config.queue.address(),
        "Seeding {}/{} into tube \"{}\"",
        config.producer.from,
        config.producer.to,
        config.queue.tube
    );

    let queue: Arc<dyn QueueClient> = Arc::new(
        BeanstalkQueue::connect(config.queue.clone())
            .await
            .with_context(|| format!("Failed to connect to beanstalkd {}", config.queue.address()))?,
    );
    let producer = Producer::new(Arc::clone(&queue), config.queue.tube.clone());

    let result = seed(&producer, &config.producer).await;

    if let Err(e) = queue.quit().await {
        warn!("Failed to close queue connection: {}", e);
    }

    let job_id = result.context("Failed to seed job")?;
    info!("Seeded job {}", job_id);
    Ok(())
}

async fn seed(producer: &Producer, defaults: &ProducerDefaults) -> QueueResult<JobId> {
    producer.use_tube().await?;
    producer.produce(defaults.put_options()).await
}
