//! Worker configuration.
//!
//! A deployment profile (`FXRATE_ENV=development|production`) supplies
//! defaults for every setting; individual environment variables override
//! them field by field.

use std::fmt;
use std::str::FromStr;

use fxrate_fetcher::XeScraperConfig;
use fxrate_models::RatePayload;
use fxrate_queue::{PutOptions, QueueConfig};
use fxrate_store::StoreConfig;

use crate::options::ConsumeOptions;

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Development,
    Production,
}

impl Profile {
    /// Read `FXRATE_ENV`, falling back to development.
    pub fn from_env() -> Self {
        std::env::var("FXRATE_ENV")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }

    fn queue(&self) -> QueueConfig {
        match self {
            Profile::Development => QueueConfig::default(),
            Profile::Production => QueueConfig {
                host: "challenge.aftership.net".to_string(),
                ..QueueConfig::default()
            },
        }
    }

    fn producer(&self) -> ProducerDefaults {
        match self {
            Profile::Development => ProducerDefaults::default(),
            Profile::Production => ProducerDefaults {
                ttr: 20,
                ..ProducerDefaults::default()
            },
        }
    }

    /// Consumer settings of the profile, with priority/TTR taken from the
    /// producer section so that requeued jobs look like seeded ones.
    fn consume(&self, producer: &ProducerDefaults) -> ConsumeOptions {
        let base = ConsumeOptions {
            priority: producer.priority,
            ttr: producer.ttr,
            ..ConsumeOptions::default()
        };
        match self {
            Profile::Development => ConsumeOptions {
                success_delay: 5,
                failure_delay: 0,
                success_trials: 10,
                tolerance: 2,
                ..base
            },
            Profile::Production => ConsumeOptions {
                success_delay: 60,
                failure_delay: 3,
                success_trials: 10,
                tolerance: 2,
                ..base
            },
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            other => Err(format!("unknown profile: {}", other)),
        }
    }
}

/// Settings for seeding a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerDefaults {
    pub priority: u32,
    /// Seconds
    pub delay: u32,
    /// Seconds
    pub ttr: u32,
    pub from: String,
    pub to: String,
}

impl Default for ProducerDefaults {
    fn default() -> Self {
        Self {
            priority: 0,
            delay: 0,
            ttr: 10,
            from: "HKD".to_string(),
            to: "USD".to_string(),
        }
    }
}

impl ProducerDefaults {
    /// Apply environment overrides on top of `defaults`.
    pub fn from_env_with(defaults: Self) -> Self {
        Self {
            priority: std::env::var("PRODUCER_PRIORITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.priority),
            delay: std::env::var("PRODUCER_DELAY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.delay),
            ttr: std::env::var("PRODUCER_TTR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ttr),
            from: std::env::var("FX_FROM").unwrap_or(defaults.from),
            to: std::env::var("FX_TO").unwrap_or(defaults.to),
        }
    }

    /// Put options for a fresh job with zeroed counters.
    pub fn put_options(&self) -> PutOptions {
        PutOptions::new(RatePayload::new(&self.from, &self.to))
            .with_priority(self.priority)
            .with_delay(self.delay)
            .with_ttr(self.ttr)
    }
}

/// Complete worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub profile: Profile,
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub fetcher: XeScraperConfig,
    pub producer: ProducerDefaults,
    pub consume: ConsumeOptions,
    /// Port for the Prometheus exporter; disabled when unset
    pub metrics_port: Option<u16>,
}

impl WorkerConfig {
    /// Built-in settings of a profile, without environment overrides.
    pub fn for_profile(profile: Profile) -> Self {
        let producer = profile.producer();
        let consume = profile.consume(&producer);
        Self {
            profile,
            queue: covering_requeue(profile.queue(), &consume),
            store: StoreConfig::default(),
            fetcher: XeScraperConfig::default(),
            consume,
            producer,
            metrics_port: None,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let profile = Profile::from_env();
        let defaults = Self::for_profile(profile);

        let producer = ProducerDefaults::from_env_with(defaults.producer);
        let consume = ConsumeOptions::from_env_with(ConsumeOptions {
            priority: producer.priority,
            ttr: producer.ttr,
            ..defaults.consume
        });

        Self {
            profile,
            queue: covering_requeue(QueueConfig::from_env_with(defaults.queue), &consume),
            store: StoreConfig::from_env_with(defaults.store),
            fetcher: XeScraperConfig::from_env_with(defaults.fetcher),
            producer,
            consume,
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// A successor is put with the success or failure delay and must become
/// ready before the reserve waiting for it gives up.
fn covering_requeue(queue: QueueConfig, consume: &ConsumeOptions) -> QueueConfig {
    queue.covering_delay(consume.success_delay.max(consume.failure_delay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_profile_parse() {
        assert_eq!("production".parse::<Profile>().unwrap(), Profile::Production);
        assert_eq!("Dev".parse::<Profile>().unwrap(), Profile::Development);
        assert!("staging".parse::<Profile>().is_err());
    }

    #[test]
    fn test_development_profile() {
        let config = WorkerConfig::for_profile(Profile::Development);

        assert_eq!(config.queue.host, "localhost");
        assert_eq!(config.queue.port, 11300);
        assert_eq!(config.producer.ttr, 10);
        assert_eq!(config.consume.success_delay, 5);
        assert_eq!(config.consume.failure_delay, 0);
        assert_eq!(config.consume.success_trials, 10);
        assert_eq!(config.consume.tolerance, 2);
        assert_eq!(config.consume.ttr, 10);
        assert_eq!(config.consume.priority, 0);
    }

    #[test]
    fn test_production_profile() {
        let config = WorkerConfig::for_profile(Profile::Production);

        assert_eq!(config.queue.host, "challenge.aftership.net");
        assert_eq!(config.producer.ttr, 20);
        assert_eq!(config.consume.success_delay, 60);
        assert_eq!(config.consume.failure_delay, 3);
        assert_eq!(config.consume.ttr, 20);
    }

    #[test]
    fn test_reserve_outwaits_requeue_delays() {
        for profile in [Profile::Development, Profile::Production] {
            let config = WorkerConfig::for_profile(profile);
            let longest = config.consume.success_delay.max(config.consume.failure_delay);

            assert!(
                config.queue.reserve_timeout > Duration::from_secs(u64::from(longest)),
                "{} profile reserve timeout {:?} does not cover a {}s requeue",
                profile,
                config.queue.reserve_timeout,
                longest
            );
        }
    }

    #[test]
    fn test_producer_put_options() {
        let options = ProducerDefaults::default().put_options();

        assert_eq!(options.payload, RatePayload::new("HKD", "USD"));
        assert_eq!(options.priority, 0);
        assert_eq!(options.delay, 0);
        assert_eq!(options.ttr, 10);
    }
}
