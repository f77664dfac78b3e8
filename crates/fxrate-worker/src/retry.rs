//! Backoff for repeated queue failures.
//!
//! The consumer uses this when reserving fails for reasons other than the
//! idle timeout. Each consecutive failure waits twice as long as the
//! previous one up to a cap, and once the streak gets long the individual
//! failures stop being logged.

use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff over a streak of consecutive failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,
    /// Maximum delay between attempts.
    pub max: Duration,
    failures: u32,
    quiet_after: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
            quiet_after: u32::MAX,
        }
    }

    /// Log only the first `n` failures of a streak.
    pub fn with_quiet_after(mut self, n: u32) -> Self {
        self.quiet_after = n;
        self
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        if self.failures == self.quiet_after.saturating_add(1) {
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.quiet_after
            );
        }
        self.delay_for(self.failures)
    }

    /// Consecutive failures in the current streak.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the latest failure should be logged.
    pub fn should_log(&self) -> bool {
        self.failures <= self.quiet_after
    }

    /// End the streak.
    pub fn reset(&mut self) {
        if self.failures > self.quiet_after {
            debug!("Recovered after {} consecutive failures", self.failures);
        }
        self.failures = 0;
    }

    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base.saturating_mul(2u32.pow(exponent)).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));

        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(backoff.delay_for(10), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_fail_advances_streak() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));

        assert_eq!(backoff.fail(), Duration::from_millis(100));
        assert_eq!(backoff.fail(), Duration::from_millis(200));
        assert_eq!(backoff.failures(), 2);

        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.fail(), Duration::from_millis(100));
    }

    #[test]
    fn test_logging_goes_quiet_after_streak() {
        let mut backoff =
            Backoff::new(Duration::from_millis(1), Duration::from_millis(10)).with_quiet_after(3);

        for _ in 0..3 {
            backoff.fail();
            assert!(backoff.should_log());
        }
        backoff.fail();
        assert!(!backoff.should_log());
        backoff.fail();
        assert!(!backoff.should_log());
        assert_eq!(backoff.failures(), 5);

        backoff.reset();
        backoff.fail();
        assert!(backoff.should_log());
    }
}
