//! Currency pair.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source/target currency pair, e.g. HKD -> USD.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Currency being converted
    pub from: String,
    /// Currency converted into
    pub to: String,
}

impl CurrencyPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Both codes are non-empty ASCII alphanumerics.
    pub fn is_valid(&self) -> bool {
        fn valid_code(code: &str) -> bool {
            !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric())
        }
        valid_code(&self.from) && valid_code(&self.to)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_display() {
        assert_eq!(CurrencyPair::new("HKD", "USD").to_string(), "HKD/USD");
    }

    #[test]
    fn test_pair_validation() {
        assert!(CurrencyPair::new("HKD", "USD").is_valid());
        assert!(!CurrencyPair::new("", "USD").is_valid());
        assert!(!CurrencyPair::new("HKD", "U SD").is_valid());
    }
}
