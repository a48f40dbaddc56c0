//! Retry-with-backoff policy shared by the fetch and extraction call sites
//!
//! Each call site owns its own [`RetryPolicy`]; the policy only computes how
//! many attempts are allowed and how long to wait before each retry. Deciding
//! whether a given error is retryable stays with the caller.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Growth factor between consecutive retries
    pub multiplier: f64,

    /// Random spread applied to each delay, as a fraction of it
    pub jitter: f64,

    /// Upper bound on a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            max_delay: Duration::ZERO,
        }
    }

    /// A policy that retries `max_retries` times without waiting (for tests)
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::no_retry()
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns true if another attempt is allowed after `attempts_made` attempts
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }

    /// Delay before retry number `retry` (1-based), without jitter
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let factor = self.multiplier.powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay before retry number `retry` (1-based), with jitter applied
    ///
    /// The jittered delay stays within `[d * (1 - jitter), d * (1 + jitter)]`
    /// and never exceeds `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }

        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let millis = base.as_millis() as f64 * (1.0 + spread);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: 0.0,
            max_delay: Duration::from_secs(3),
        }
    }

    #[test]
    fn test_max_attempts_counts_first_try() {
        assert_eq!(policy().max_attempts(), 4);
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
    }

    #[test]
    fn test_should_retry() {
        let policy = policy();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(3));
        assert!(!policy.should_retry(4));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = policy();
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.base_delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = policy();
        assert_eq!(policy.base_delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.base_delay_for(10), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut policy = policy();
        policy.jitter = 0.25;
        for _ in 0..100 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(750), "{:?}", delay);
            assert!(delay <= Duration::from_millis(1250), "{:?}", delay);
        }
    }

    #[test]
    fn test_immediate_policy_has_no_delay() {
        let policy = RetryPolicy::immediate(2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 1_000,
            multiplier: 3.0,
            jitter: 0.1,
            max_delay_ms: 60_000,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(3));
    }
}
