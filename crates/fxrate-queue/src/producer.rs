//! Job producer.

use std::sync::Arc;

use tracing::info;

use fxrate_models::{JobId, RatePayload};

use crate::client::QueueClient;
use crate::error::{QueueError, QueueResult};

/// Options for a single `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// Job priority (lower is more urgent)
    pub priority: u32,
    /// Seconds before the job becomes ready
    pub delay: u32,
    /// Time-to-run lease in seconds
    pub ttr: u32,
    pub payload: RatePayload,
}

impl PutOptions {
    /// Defaults: priority 0, no delay, 60 second TTR.
    pub fn new(payload: RatePayload) -> Self {
        Self {
            priority: 0,
            delay: 0,
            ttr: 60,
            payload,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_ttr(mut self, ttr: u32) -> Self {
        self.ttr = ttr;
        self
    }
}

/// Enqueues rate-fetch jobs into one tube.
#[derive(Clone)]
pub struct Producer {
    queue: Arc<dyn QueueClient>,
    tube: String,
}

impl Producer {
    pub fn new(queue: Arc<dyn QueueClient>, tube: impl Into<String>) -> Self {
        Self {
            queue,
            tube: tube.into(),
        }
    }

    pub fn tube(&self) -> &str {
        &self.tube
    }

    /// Select the producer's tube. Must succeed before `produce`.
    pub async fn use_tube(&self) -> QueueResult<String> {
        info!("Use beanstalkd tube \"{}\"", self.tube);
        self.queue.use_tube(&self.tube).await
    }

    /// Serialize the payload and enqueue it. Returns the new job id.
    pub async fn produce(&self, options: PutOptions) -> QueueResult<JobId> {
        if !options.payload.pair().is_valid() {
            return Err(QueueError::InvalidPayload(format!(
                "invalid currency pair {}",
                options.payload.pair()
            )));
        }

        let body = options.payload.to_vec()?;
        info!(
            tube = %self.tube,
            priority = options.priority,
            delay = options.delay,
            ttr = options.ttr,
            "Put job with payload {}",
            String::from_utf8_lossy(&body)
        );

        self.queue
            .put(options.priority, options.delay, options.ttr, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::client::ReservedJob;

    #[derive(Default)]
    struct RecordingQueue {
        used: Mutex<Vec<String>>,
        puts: Mutex<Vec<(u32, u32, u32, Vec<u8>)>>,
    }

    #[async_trait]
    impl QueueClient for RecordingQueue {
        async fn watch(&self, _tube: &str) -> QueueResult<u32> {
            Ok(1)
        }

        async fn ignore(&self, _tube: &str) -> QueueResult<u32> {
            Ok(1)
        }

        async fn use_tube(&self, tube: &str) -> QueueResult<String> {
            self.used.lock().unwrap().push(tube.to_string());
            Ok(tube.to_string())
        }

        async fn reserve(&self) -> QueueResult<ReservedJob> {
            Err(QueueError::TimedOut)
        }

        async fn delete(&self, _id: JobId) -> QueueResult<()> {
            Ok(())
        }

        async fn bury(&self, _id: JobId, _priority: u32) -> QueueResult<()> {
            Ok(())
        }

        async fn put(&self, priority: u32, delay: u32, ttr: u32, body: &[u8]) -> QueueResult<JobId> {
            let mut puts = self.puts.lock().unwrap();
            puts.push((priority, delay, ttr, body.to_vec()));
            Ok(JobId(puts.len() as u64))
        }

        async fn quit(&self) -> QueueResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_put_option_defaults() {
        let options = PutOptions::new(RatePayload::new("HKD", "USD"));
        assert_eq!(options.priority, 0);
        assert_eq!(options.delay, 0);
        assert_eq!(options.ttr, 60);
    }

    #[tokio::test]
    async fn test_produce_serializes_payload() {
        let queue = Arc::new(RecordingQueue::default());
        let producer = Producer::new(queue.clone(), "fxrate");

        producer.use_tube().await.unwrap();
        let payload = RatePayload::new("HKD", "USD").with_success_count(2);
        let id = producer
            .produce(PutOptions::new(payload.clone()).with_delay(5).with_ttr(10))
            .await
            .unwrap();

        assert_eq!(id, JobId(1));
        assert_eq!(queue.used.lock().unwrap().as_slice(), ["fxrate".to_string()]);

        let puts = queue.puts.lock().unwrap();
        let (priority, delay, ttr, body) = &puts[0];
        assert_eq!((*priority, *delay, *ttr), (0, 5, 10));
        assert_eq!(RatePayload::from_slice(body).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_produce_rejects_invalid_pair() {
        let queue = Arc::new(RecordingQueue::default());
        let producer = Producer::new(queue.clone(), "fxrate");

        let result = producer.produce(PutOptions::new(RatePayload::new("", "USD"))).await;
        assert!(matches!(result, Err(QueueError::InvalidPayload(_))));
        assert!(queue.puts.lock().unwrap().is_empty());
    }
}
