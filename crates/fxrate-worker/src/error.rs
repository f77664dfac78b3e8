//! Worker error types.

use std::time::Duration;

use thiserror::Error;

use fxrate_fetcher::FetchError;
use fxrate_models::JobId;
use fxrate_queue::QueueError;
use fxrate_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Job {job_id} has an undecodable payload: {reason}")]
    PayloadDecode { job_id: JobId, reason: String },

    #[error("Failed to requeue successor of job {job_id}: {source}")]
    Requeue { job_id: JobId, source: QueueError },

    #[error("Failed to delete job {job_id}: {source}")]
    Delete { job_id: JobId, source: QueueError },

    #[error("Failed to bury job {job_id}: {source}")]
    Bury { job_id: JobId, source: QueueError },

    #[error("Giving up after {attempts} consecutive reserve failures: {source}")]
    ReserveRetriesExhausted { attempts: u32, source: QueueError },
}

impl WorkerError {
    /// Error from a queue write that may leave the job chain inconsistent.
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::Requeue { .. } | WorkerError::Delete { .. } | WorkerError::Bury { .. }
        )
    }
}

/// Why a fetch-and-persist attempt failed. All variants count the same
/// toward the failure counter.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Persistence failed: {0}")]
    Persist(#[from] StoreError),

    #[error("Attempt timed out after {0:?}")]
    TimedOut(Duration),
}

impl AttemptError {
    /// Label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Fetch(e) => e.kind().as_str(),
            AttemptError::Persist(_) => "persistence",
            AttemptError::TimedOut(_) => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_error_kinds() {
        assert_eq!(
            AttemptError::from(FetchError::format_mismatch("bad")).kind(),
            "format_mismatch"
        );
        assert_eq!(
            AttemptError::from(FetchError::unexpected_response("500")).kind(),
            "unexpected_response"
        );
        assert_eq!(AttemptError::TimedOut(Duration::from_secs(1)).kind(), "timeout");
    }

    #[test]
    fn test_write_failures() {
        let err = WorkerError::Delete {
            job_id: JobId(1),
            source: QueueError::ConnectionClosed,
        };
        assert!(err.is_write_failure());
        assert!(!WorkerError::Queue(QueueError::ConnectionClosed).is_write_failure());
    }
}
