//! Transport-level retry with exponential backoff and jitter.
//!
//! [`BackoffConfig`] controls how transient provider errors (429, 5xx,
//! timeouts) are retried. Every stage call in the pipeline goes through it;
//! the default is [`BackoffConfig::interactive()`] because a user is waiting
//! on the other end of the request.

use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff and jitter.
///
/// # Example
///
/// ```
/// use blog_pipeline::backend::BackoffConfig;
///
/// let policy = BackoffConfig::interactive();
/// assert_eq!(policy.max_retries, 2);
///
/// let off = BackoffConfig::none();
/// assert_eq!(off.max_retries, 0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,

    /// Ceiling for any single delay.
    pub max_delay: Duration,

    /// Jitter strategy.
    pub jitter: JitterStrategy,

    /// HTTP status codes that count as transient.
    pub retryable_statuses: Vec<u16>,

    /// Honour `Retry-After` from the provider, capped at `max_delay`.
    pub respect_retry_after: bool,
}

/// Jitter strategy to keep concurrent runs from retrying in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,
    /// Random value in `[0, calculated_delay]`.
    Full,
    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No retry at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::interactive()
        }
    }

    /// Two retries, 500ms initial, 1.5x growth, 10s ceiling.
    pub fn interactive() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Base delay for retry number `attempt` (0-indexed), before jitter.
    fn base_delay(&self, attempt: u32) -> f64 {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        base.min(self.max_delay.as_secs_f64())
    }

    /// Calculate the delay for retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = self.base_delay(attempt);
        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };
        Duration::from_secs_f64(jittered)
    }

    /// Delay to wait given an optional provider hint.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if self.respect_retry_after => hint.min(self.max_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429],
            respect_retry_after: true,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = no_jitter();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_full_jitter_stays_in_range() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Full,
            ..no_jitter()
        };
        for _ in 0..100 {
            assert!(config.delay_for_attempt(1) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_equal_jitter_has_floor() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Equal,
            ..no_jitter()
        };
        for _ in 0..100 {
            let d = config.delay_for_attempt(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let config = no_jitter();
        assert_eq!(
            config.delay_with_hint(0, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            config.delay_with_hint(0, Some(Duration::from_secs(120))),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_retry_after_ignored_when_disabled() {
        let config = BackoffConfig {
            respect_retry_after: false,
            ..no_jitter()
        };
        assert_eq!(
            config.delay_with_hint(1, Some(Duration::from_secs(30))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_presets() {
        assert_eq!(BackoffConfig::none().max_retries, 0);
        let interactive = BackoffConfig::default();
        assert_eq!(interactive.max_retries, 2);
        assert!(interactive.retryable_statuses.contains(&429));
        assert!(!interactive.retryable_statuses.contains(&401));
    }
}
