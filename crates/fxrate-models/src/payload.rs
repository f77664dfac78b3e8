//! Rate-fetch job payload.
//!
//! The payload travels inside the queue job body as JSON:
//!
//! ```json
//! { "from": "HKD", "to": "USD", "success_count": 1, "failure_count": 0 }
//! ```
//!
//! Counters are optional on the wire; missing or `null` counters read as 0.

use serde::{Deserialize, Deserializer, Serialize};

use crate::CurrencyPair;

/// Body of a rate-fetch job, carrying the retry counters of its chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePayload {
    /// Currency being converted
    pub from: String,
    /// Currency converted into
    pub to: String,
    /// Successful attempts so far in this retry chain
    #[serde(default, deserialize_with = "null_as_zero")]
    pub success_count: u32,
    /// Failed attempts so far in this retry chain
    #[serde(default, deserialize_with = "null_as_zero")]
    pub failure_count: u32,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}

impl RatePayload {
    /// Create a fresh payload with zeroed counters.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            success_count: 0,
            failure_count: 0,
        }
    }

    /// Set the success counter.
    pub fn with_success_count(mut self, count: u32) -> Self {
        self.success_count = count;
        self
    }

    /// Set the failure counter.
    pub fn with_failure_count(mut self, count: u32) -> Self {
        self.failure_count = count;
        self
    }

    /// Decode a payload from a raw job body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Encode the payload as a job body.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(&self.from, &self.to)
    }

    /// Count one successful attempt, returning the new total.
    pub fn record_success(&mut self) -> u32 {
        self.success_count = self.success_count.saturating_add(1);
        self.success_count
    }

    /// Count one failed attempt, returning the new total.
    pub fn record_failure(&mut self) -> u32 {
        self.failure_count = self.failure_count.saturating_add(1);
        self.failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_counters_default_to_zero() {
        let payload = RatePayload::from_slice(br#"{"from":"HKD","to":"USD"}"#).unwrap();
        assert_eq!(payload, RatePayload::new("HKD", "USD"));
    }

    #[test]
    fn test_null_counters_default_to_zero() {
        let payload = RatePayload::from_slice(
            br#"{"from":"HKD","to":"USD","success_count":null,"failure_count":null}"#,
        )
        .unwrap();
        assert_eq!(payload.success_count, 0);
        assert_eq!(payload.failure_count, 0);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let payload =
            RatePayload::from_slice(br#"{"from":"HKD","to":"USD","success_count":3,"note":"x"}"#)
                .unwrap();
        assert_eq!(payload.success_count, 3);
    }

    #[test]
    fn test_rejects_malformed_bodies() {
        assert!(RatePayload::from_slice(b"not json").is_err());
        assert!(RatePayload::from_slice(br#"{"from":"HKD"}"#).is_err());
        assert!(RatePayload::from_slice(br#"{"from":"HKD","to":"USD","success_count":-1}"#).is_err());
    }

    #[test]
    fn test_counters_survive_encoding() {
        let payload = RatePayload::new("HKD", "USD")
            .with_success_count(4)
            .with_failure_count(1);
        let body = payload.to_vec().unwrap();

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success_count"], 4);
        assert_eq!(json["failure_count"], 1);
        assert_eq!(RatePayload::from_slice(&body).unwrap(), payload);
    }

    #[test]
    fn test_record_increments_one_counter() {
        let mut payload = RatePayload::new("HKD", "USD");
        assert_eq!(payload.record_success(), 1);
        assert_eq!(payload.failure_count, 0);
        assert_eq!(payload.record_failure(), 1);
        assert_eq!(payload.success_count, 1);
    }
}
