//! Exchange rate fetching.
//!
//! This crate provides:
//! - The `RateFetcher` capability trait used by the worker
//! - `XeScraper`, which reads a rate off the xe.com converter page

pub mod error;
pub mod xe;

use async_trait::async_trait;
use fxrate_models::CurrencyPair;

pub use error::{FetchError, FetchErrorKind, FetchResult};
pub use xe::{XeScraper, XeScraperConfig};

/// Looks up the current exchange rate for a currency pair.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    /// Returns the rate as a decimal string.
    async fn fetch(&self, pair: &CurrencyPair) -> FetchResult<String>;
}
