//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Serve `/metrics` on `0.0.0.0:port`. Must be called inside the runtime.
pub fn install_exporter(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_RESERVED_TOTAL: &str = "fxrate_jobs_reserved_total";
    pub const JOBS_OUTCOME_TOTAL: &str = "fxrate_jobs_outcome_total";
    pub const FETCH_ATTEMPTS_TOTAL: &str = "fxrate_fetch_attempts_total";
    pub const RESERVE_ERRORS_TOTAL: &str = "fxrate_reserve_errors_total";
    pub const ATTEMPT_DURATION_SECONDS: &str = "fxrate_attempt_duration_seconds";
}

pub fn record_job_reserved(tube: &str) {
    let labels = [("tube", tube.to_string())];
    counter!(names::JOBS_RESERVED_TOTAL, &labels).increment(1);
}

/// Record how a reserved job was disposed of.
pub fn record_job_outcome(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::JOBS_OUTCOME_TOTAL, &labels).increment(1);
}

/// Record a fetch-and-persist attempt. `result` is `success` or the error kind.
pub fn record_fetch_attempt(result: &str, duration_secs: f64) {
    let labels = [("result", result.to_string())];
    counter!(names::FETCH_ATTEMPTS_TOTAL, &labels).increment(1);
    histogram!(names::ATTEMPT_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_reserve_error() {
    counter!(names::RESERVE_ERRORS_TOTAL).increment(1);
}
