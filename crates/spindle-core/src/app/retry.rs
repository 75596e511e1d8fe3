//! Retry policy: backoff delays for runners.
//!
//! The loader itself retries a record forever, immediately, for as long as
//! the runner says the failure is retryable. Runners that want backoff write
//! a new retry timestamp onto the record in `did_fail`; this policy computes
//! it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay_ms: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Delays never exceed this.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 5 * 60 * 1_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt.
    ///
    /// `attempts` is the number of attempts already made (1-indexed):
    /// delay = base_delay * multiplier^(attempts - 1), capped at `max_delay_ms`.
    ///
    /// With base=2s, multiplier=2.0: 2s, 4s, 8s, 16s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Absolute retry timestamp (ms since epoch) for a record that has failed
    /// `attempts` times as of `now_millis`.
    pub fn next_retry_timestamp(&self, now_millis: u64, attempts: u32) -> u64 {
        let delay = u64::try_from(self.next_delay(attempts).as_millis()).unwrap_or(u64::MAX);
        now_millis.saturating_add(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay_ms, 2_000);
        assert_eq!(policy.multiplier, 2.0);
    }

    #[rstest]
    #[case(0, 2)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(5, 32)]
    fn exponential_backoff(#[case] attempts: u32, #[case] expected_secs: u64) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(attempts), Duration::from_secs(expected_secs));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_delay_ms: 10_000,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_delay(30), Duration::from_secs(10));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn retry_timestamp_is_relative_to_now() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_retry_timestamp(1_000, 2), 5_000);
        assert_eq!(policy.next_retry_timestamp(u64::MAX - 1, 1), u64::MAX);
    }
}
