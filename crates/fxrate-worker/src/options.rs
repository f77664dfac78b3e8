//! Consumer options.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What to do with a reserved job whose chain already met its success quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotaPolicy {
    /// Quarantine it for inspection.
    #[default]
    Bury,
    /// Drop it.
    Delete,
}

impl QuotaPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaPolicy::Bury => "bury",
            QuotaPolicy::Delete => "delete",
        }
    }
}

impl fmt::Display for QuotaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bury" => Ok(QuotaPolicy::Bury),
            "delete" => Ok(QuotaPolicy::Delete),
            other => Err(format!("unknown quota policy: {}", other)),
        }
    }
}

/// Options for one consume run, resolved once at construction.
///
/// Delays and TTR are whole seconds, as the queue takes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// Priority of re-enqueued jobs
    pub priority: u32,
    /// TTR of re-enqueued jobs
    pub ttr: u32,
    /// Delay before the next attempt after a success
    pub success_delay: u32,
    /// Delay before the next attempt after a failure
    pub failure_delay: u32,
    /// Successful fetches that complete a chain
    pub success_trials: u32,
    /// Failures allowed before the job is buried
    pub tolerance: u32,
    /// Priority given to buried jobs
    pub bury_priority: u32,
    pub quota_policy: QuotaPolicy,
    /// Upper bound on fetch + persist for one attempt
    pub attempt_timeout: Duration,
    /// Consecutive reserve failures tolerated before giving up
    pub max_reserve_retries: u32,
    /// First backoff after a reserve failure (doubles each time)
    pub reserve_backoff: Duration,
    pub reserve_backoff_max: Duration,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            ttr: 10,
            success_delay: 60,
            failure_delay: 3,
            success_trials: 10,
            tolerance: 2,
            bury_priority: 0,
            quota_policy: QuotaPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
            max_reserve_retries: 5,
            reserve_backoff: Duration::from_millis(500),
            reserve_backoff_max: Duration::from_secs(30),
        }
    }
}

impl ConsumeOptions {
    /// Create options from environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(Self::default())
    }

    /// Apply environment overrides on top of `defaults`.
    pub fn from_env_with(defaults: Self) -> Self {
        fn parsed<T: FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|s| s.parse().ok())
        }

        Self {
            priority: parsed("CONSUMER_PRIORITY").unwrap_or(defaults.priority),
            ttr: parsed("CONSUMER_TTR").unwrap_or(defaults.ttr),
            success_delay: parsed("CONSUMER_SUCCESS_DELAY").unwrap_or(defaults.success_delay),
            failure_delay: parsed("CONSUMER_FAILURE_DELAY").unwrap_or(defaults.failure_delay),
            success_trials: parsed("CONSUMER_SUCCESS_TRIALS").unwrap_or(defaults.success_trials),
            tolerance: parsed("CONSUMER_TOLERANCE").unwrap_or(defaults.tolerance),
            bury_priority: parsed("CONSUMER_BURY_PRIORITY").unwrap_or(defaults.bury_priority),
            quota_policy: parsed("CONSUMER_QUOTA_POLICY").unwrap_or(defaults.quota_policy),
            attempt_timeout: parsed("CONSUMER_ATTEMPT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.attempt_timeout),
            max_reserve_retries: parsed("CONSUMER_MAX_RESERVE_RETRIES")
                .unwrap_or(defaults.max_reserve_retries),
            reserve_backoff: parsed("CONSUMER_RESERVE_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reserve_backoff),
            reserve_backoff_max: parsed("CONSUMER_RESERVE_BACKOFF_MAX_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reserve_backoff_max),
        }
    }
}
