//! Shared data models for the FxRate worker.
//!
//! This crate provides Serde-serializable types for:
//! - Queue job identifiers
//! - Rate-fetch job payloads and their retry counters
//! - Persisted exchange rate records

pub mod job;
pub mod pair;
pub mod payload;
pub mod rate;

// Re-export common types
pub use job::JobId;
pub use pair::CurrencyPair;
pub use payload::RatePayload;
pub use rate::ExchangeRateRecord;
