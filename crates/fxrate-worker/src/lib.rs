//! Exchange rate fetch worker.
//!
//! This crate provides:
//! - The consumer loop that reserves rate-fetch jobs and drives their
//!   retry chain (requeue, complete, or quarantine)
//! - Profile-based configuration
//! - Reservation backoff, cooperative shutdown, logging and metrics

pub mod config;
pub mod consumer;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod options;
pub mod retry;
pub mod shutdown;

pub use config::{Profile, ProducerDefaults, WorkerConfig};
pub use consumer::{ConsumeSummary, Consumer, JobOutcome, StopReason};
pub use error::{AttemptError, WorkerError, WorkerResult};
pub use lifecycle::{AttemptOutcome, Transition};
pub use logging::JobLogger;
pub use options::{ConsumeOptions, QuotaPolicy};
pub use shutdown::{Shutdown, ShutdownHandle};
