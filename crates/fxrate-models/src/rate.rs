//! Persisted exchange rate records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CurrencyPair;

/// One successful rate lookup, created once per fetch and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateRecord {
    pub from: String,
    pub to: String,
    /// Decimal rate as text, e.g. "0.13"
    pub rate: String,
    pub created_at: DateTime<Utc>,
}

impl ExchangeRateRecord {
    /// Create a record stamped with the current time.
    pub fn new(pair: &CurrencyPair, rate: impl Into<String>) -> Self {
        Self {
            from: pair.from.clone(),
            to: pair.to.clone(),
            rate: rate.into(),
            created_at: Utc::now(),
        }
    }

    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(&self.from, &self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let before = Utc::now();
        let record = ExchangeRateRecord::new(&CurrencyPair::new("HKD", "USD"), "0.13");

        assert_eq!(record.from, "HKD");
        assert_eq!(record.to, "USD");
        assert_eq!(record.rate, "0.13");
        assert!(record.created_at >= before);
        assert_eq!(record.pair(), CurrencyPair::new("HKD", "USD"));
    }
}
