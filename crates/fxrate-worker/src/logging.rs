//! Logging setup and structured job logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fxrate_models::{JobId, RatePayload};

/// Install the global subscriber: colored text by default, JSON when
/// `LOG_FORMAT=json`. `RUST_LOG` overrides the `fxrate=info` default.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fxrate=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Logs the lifecycle events of one reserved job with its id and tube
/// attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    tube: String,
}

impl JobLogger {
    pub fn new(job_id: JobId, tube: &str) -> Self {
        Self {
            job_id,
            tube: tube.to_string(),
        }
    }

    pub fn log_reserved(&self, body: &str) {
        info!(
            job_id = %self.job_id,
            tube = %self.tube,
            "Reserved job with payload {}", body
        );
    }

    pub fn log_fetched(&self, rate: &str, record_id: &str) {
        info!(
            job_id = %self.job_id,
            tube = %self.tube,
            record_id = %record_id,
            "Fetched and saved rate {}", rate
        );
    }

    pub fn log_attempt_failed(&self, kind: &str, message: &str) {
        warn!(
            job_id = %self.job_id,
            tube = %self.tube,
            error_kind = kind,
            "Attempt failed: {}", message
        );
    }

    pub fn log_requeued(&self, next_id: JobId, payload: &RatePayload, delay: u32) {
        info!(
            job_id = %self.job_id,
            tube = %self.tube,
            next_job_id = %next_id,
            success_count = payload.success_count,
            failure_count = payload.failure_count,
            "Requeued job with delay {}s", delay
        );
    }

    pub fn log_deleted(&self) {
        info!(job_id = %self.job_id, tube = %self.tube, "Deleted job");
    }

    pub fn log_buried(&self, reason: &str) {
        warn!(job_id = %self.job_id, tube = %self.tube, "Buried job: {}", reason);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, tube = %self.tube, "Job error: {}", message);
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn tube(&self) -> &str {
        &self.tube
    }

    /// Span wrapping all work done for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, tube = %self.tube)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let logger = JobLogger::new(JobId(42), "fxrate");

        assert_eq!(logger.job_id(), JobId(42));
        assert_eq!(logger.tube(), "fxrate");
    }
}
