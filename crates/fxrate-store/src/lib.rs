//! Exchange rate persistence.
//!
//! This crate provides:
//! - The `RateStore` capability trait used by the worker
//! - `RedisRateStore`, appending records to a Redis stream

pub mod error;
pub mod redis_store;

use async_trait::async_trait;
use fxrate_models::CurrencyPair;

pub use error::{StoreError, StoreResult};
pub use redis_store::{RedisRateStore, StoreConfig};

/// Persists fetched exchange rates.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Record one fetched rate. Returns the id of the stored record.
    async fn save(&self, pair: &CurrencyPair, rate: &str) -> StoreResult<String>;
}
