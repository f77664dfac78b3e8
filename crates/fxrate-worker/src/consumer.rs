//! Rate-fetch consumer.
//!
//! One reservation is processed end to end (decode, fetch, persist, decide,
//! requeue/delete/bury) before the next one is reserved. The loop ends when
//! a reserve times out with nothing to do, when shutdown is requested, or
//! when a queue write fails.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn, Instrument};

use fxrate_fetcher::RateFetcher;
use fxrate_models::{CurrencyPair, RatePayload};
use fxrate_queue::{Producer, PutOptions, QueueClient, ReservedJob};
use fxrate_store::RateStore;

use crate::error::{AttemptError, WorkerError, WorkerResult};
use crate::lifecycle::{next_transition, quota_satisfied, AttemptOutcome, Transition};
use crate::logging::JobLogger;
use crate::metrics;
use crate::options::{ConsumeOptions, QuotaPolicy};
use crate::retry::Backoff;
use crate::shutdown::Shutdown;

/// Reserve failures logged individually before the rest are suppressed.
const MAX_LOGGED_RESERVE_FAILURES: u32 = 3;

/// Tube every beanstalkd connection starts out watching.
const DEFAULT_TUBE: &str = "default";

/// How a single reserved job was disposed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    RequeuedSuccess,
    RequeuedFailure,
    Completed,
    Buried,
    /// Chain had already met its quota; handled per `QuotaPolicy`.
    QuotaSatisfied,
    /// Body was not a usable payload; buried.
    Undecodable,
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::RequeuedSuccess => "requeued_success",
            JobOutcome::RequeuedFailure => "requeued_failure",
            JobOutcome::Completed => "completed",
            JobOutcome::Buried => "buried",
            JobOutcome::QuotaSatisfied => "skipped",
            JobOutcome::Undecodable => "undecodable",
        }
    }

    fn from_transition(transition: &Transition) -> Self {
        match transition {
            Transition::Requeue {
                after: AttemptOutcome::Succeeded,
                ..
            } => JobOutcome::RequeuedSuccess,
            Transition::Requeue {
                after: AttemptOutcome::Failed,
                ..
            } => JobOutcome::RequeuedFailure,
            Transition::Complete { .. } => JobOutcome::Completed,
            Transition::Quarantine { .. } => JobOutcome::Buried,
        }
    }
}

/// Why `consume` returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// A reserve timed out with no job ready.
    #[default]
    Idle,
    Shutdown,
}

/// Per-outcome counts of one `consume` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub reserved: u64,
    pub requeued_success: u64,
    pub requeued_failure: u64,
    pub completed: u64,
    pub buried: u64,
    pub quota_satisfied: u64,
    pub undecodable: u64,
    pub stop_reason: StopReason,
}

impl ConsumeSummary {
    fn record(&mut self, outcome: JobOutcome) {
        self.reserved += 1;
        let slot = match outcome {
            JobOutcome::RequeuedSuccess => &mut self.requeued_success,
            JobOutcome::RequeuedFailure => &mut self.requeued_failure,
            JobOutcome::Completed => &mut self.completed,
            JobOutcome::Buried => &mut self.buried,
            JobOutcome::QuotaSatisfied => &mut self.quota_satisfied,
            JobOutcome::Undecodable => &mut self.undecodable,
        };
        *slot += 1;
    }
}

/// Reserves rate-fetch jobs from one tube and drives their retry chains.
pub struct Consumer {
    queue: Arc<dyn QueueClient>,
    producer: Producer,
    fetcher: Arc<dyn RateFetcher>,
    store: Arc<dyn RateStore>,
    tube: String,
    options: ConsumeOptions,
    shutdown: Shutdown,
}

impl Consumer {
    /// Create a consumer. Successor jobs are put into the same tube through
    /// the same queue connection.
    pub fn new(
        queue: Arc<dyn QueueClient>,
        fetcher: Arc<dyn RateFetcher>,
        store: Arc<dyn RateStore>,
        tube: impl Into<String>,
        options: ConsumeOptions,
        shutdown: Shutdown,
    ) -> Self {
        let tube = tube.into();
        Self {
            producer: Producer::new(Arc::clone(&queue), tube.clone()),
            queue,
            fetcher,
            store,
            tube,
            options,
            shutdown,
        }
    }

    /// Watch only the tube and select it for successor jobs. Must succeed
    /// before `consume`. Returns the number of watched tubes.
    pub async fn watch(&self) -> WorkerResult<u32> {
        info!("Watch beanstalkd tube \"{}\"", self.tube);
        let mut count = self.queue.watch(&self.tube).await?;
        if self.tube != DEFAULT_TUBE {
            count = self.queue.ignore(DEFAULT_TUBE).await?;
        }
        self.producer.use_tube().await?;
        Ok(count)
    }

    /// Run the reservation loop until idle, shutdown, or a fatal error.
    pub async fn consume(&self) -> WorkerResult<ConsumeSummary> {
        info!(
            tube = %self.tube,
            success_trials = self.options.success_trials,
            tolerance = self.options.tolerance,
            success_delay = self.options.success_delay,
            failure_delay = self.options.failure_delay,
            "Consumer started"
        );

        let mut backoff = Backoff::new(self.options.reserve_backoff, self.options.reserve_backoff_max)
            .with_quiet_after(MAX_LOGGED_RESERVE_FAILURES);
        let mut shutdown = self.shutdown.clone();
        let mut summary = ConsumeSummary::default();

        loop {
            if shutdown.is_triggered() {
                summary.stop_reason = StopReason::Shutdown;
                break;
            }

            let reserved = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    summary.stop_reason = StopReason::Shutdown;
                    break;
                }
                result = self.queue.reserve() => result,
            };

            match reserved {
                Ok(job) => {
                    backoff.reset();
                    let outcome = self.process(job).await?;
                    summary.record(outcome);
                }
                Err(e) if e.is_idle_timeout() => {
                    info!("No job ready in tube \"{}\", consumer going idle", self.tube);
                    summary.stop_reason = StopReason::Idle;
                    break;
                }
                Err(e) if e.is_transient() => {
                    metrics::record_reserve_error();
                    let delay = backoff.fail();
                    let attempts = backoff.failures();

                    if attempts > self.options.max_reserve_retries {
                        error!("Reserve failed {} times in a row: {}", attempts, e);
                        return Err(WorkerError::ReserveRetriesExhausted { attempts, source: e });
                    }

                    if backoff.should_log() {
                        warn!(
                            "Reserve failed ({}/{}), retrying in {:?}: {}",
                            attempts, self.options.max_reserve_retries, delay, e
                        );
                    }

                    tokio::select! {
                        biased;
                        _ = shutdown.triggered() => {
                            summary.stop_reason = StopReason::Shutdown;
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    metrics::record_reserve_error();
                    error!("Reserve failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        info!(
            reserved = summary.reserved,
            requeued_success = summary.requeued_success,
            requeued_failure = summary.requeued_failure,
            completed = summary.completed,
            buried = summary.buried,
            stop_reason = ?summary.stop_reason,
            "Consumer stopped"
        );
        Ok(summary)
    }

    async fn process(&self, job: ReservedJob) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(job.id, &self.tube);
        let span = logger.create_span();
        let outcome = self.handle(job, &logger).instrument(span).await?;
        metrics::record_job_outcome(outcome.label());
        Ok(outcome)
    }

    async fn handle(&self, job: ReservedJob, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        metrics::record_job_reserved(&self.tube);
        logger.log_reserved(&job.body_lossy());

        let payload = match decode(&job) {
            Ok(payload) => payload,
            Err(e) => {
                logger.log_error(&e.to_string());
                self.bury(logger, "undecodable payload").await?;
                return Ok(JobOutcome::Undecodable);
            }
        };

        if quota_satisfied(&payload, &self.options) {
            info!(
                "Success quota already met ({}/{}), policy: {}",
                payload.success_count, self.options.success_trials, self.options.quota_policy
            );
            match self.options.quota_policy {
                QuotaPolicy::Bury => self.bury(logger, "success quota already met").await?,
                QuotaPolicy::Delete => self.delete(logger).await?,
            }
            return Ok(JobOutcome::QuotaSatisfied);
        }

        let outcome = self.attempt(&payload.pair(), logger).await;
        let transition = next_transition(payload, outcome, &self.options);
        debug!(
            success_count = transition.payload().success_count,
            failure_count = transition.payload().failure_count,
            "Counters after attempt"
        );

        match &transition {
            Transition::Requeue { payload, delay, .. } => {
                let options = PutOptions::new(payload.clone())
                    .with_priority(self.options.priority)
                    .with_delay(*delay)
                    .with_ttr(self.options.ttr);
                let next_id = self
                    .producer
                    .produce(options)
                    .await
                    .map_err(|source| WorkerError::Requeue {
                        job_id: logger.job_id(),
                        source,
                    })?;
                logger.log_requeued(next_id, payload, *delay);
                self.delete(logger).await?;
            }
            Transition::Complete { payload } => {
                info!(
                    "Retry chain complete after {} successes",
                    payload.success_count
                );
                self.delete(logger).await?;
            }
            Transition::Quarantine { payload } => {
                let reason = format!(
                    "failure count {} exceeds tolerance {}",
                    payload.failure_count, self.options.tolerance
                );
                self.bury(logger, &reason).await?;
            }
        }

        Ok(JobOutcome::from_transition(&transition))
    }

    /// Fetch and persist under the attempt timeout.
    async fn attempt(&self, pair: &CurrencyPair, logger: &JobLogger) -> AttemptOutcome {
        let started = Instant::now();
        let timeout = self.options.attempt_timeout;

        let result = match tokio::time::timeout(timeout, self.fetch_and_save(pair)).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::TimedOut(timeout)),
        };
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok((rate, record_id)) => {
                metrics::record_fetch_attempt("success", elapsed);
                logger.log_fetched(&rate, &record_id);
                AttemptOutcome::Succeeded
            }
            Err(e) => {
                metrics::record_fetch_attempt(e.kind(), elapsed);
                logger.log_attempt_failed(e.kind(), &e.to_string());
                AttemptOutcome::Failed
            }
        }
    }

    async fn fetch_and_save(&self, pair: &CurrencyPair) -> Result<(String, String), AttemptError> {
        let rate = self.fetcher.fetch(pair).await?;
        let record_id = self.store.save(pair, &rate).await?;
        Ok((rate, record_id))
    }

    async fn delete(&self, logger: &JobLogger) -> WorkerResult<()> {
        let job_id = logger.job_id();
        self.queue
            .delete(job_id)
            .await
            .map_err(|source| WorkerError::Delete { job_id, source })?;
        logger.log_deleted();
        Ok(())
    }

    async fn bury(&self, logger: &JobLogger, reason: &str) -> WorkerResult<()> {
        let job_id = logger.job_id();
        self.queue
            .bury(job_id, self.options.bury_priority)
            .await
            .map_err(|source| WorkerError::Bury { job_id, source })?;
        logger.log_buried(reason);
        Ok(())
    }
}

fn decode(job: &ReservedJob) -> WorkerResult<RatePayload> {
    let payload = RatePayload::from_slice(&job.body).map_err(|e| WorkerError::PayloadDecode {
        job_id: job.id,
        reason: e.to_string(),
    })?;

    if !payload.pair().is_valid() {
        return Err(WorkerError::PayloadDecode {
            job_id: job.id,
            reason: format!("invalid currency pair {}", payload.pair()),
        });
    }

    Ok(payload)
}
