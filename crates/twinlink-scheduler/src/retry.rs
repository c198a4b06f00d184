// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential retry backoff.

use std::time::Duration;

use twinlink_config::model::SchedulerConfig;

/// `delay(n) = min(base * 2^n, max)` where `n` is the number of retries
/// already made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_secs(config.backoff_max_secs),
        }
    }

    /// Delay before the retry that follows `retry_count` earlier retries.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(base_ms: u64, max_secs: u64) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(base_ms),
            max: Duration::from_secs(max_secs),
        }
    }

    #[test]
    fn doubles_then_caps() {
        let p = policy(1000, 5);
        assert_eq!(p.delay(0), Duration::from_secs(1));
        assert_eq!(p.delay(1), Duration::from_secs(2));
        assert_eq!(p.delay(2), Duration::from_secs(4));
        assert_eq!(p.delay(3), Duration::from_secs(5));
        assert_eq!(p.delay(40), Duration::from_secs(5));
    }

    #[test]
    fn zero_base_retries_immediately() {
        assert_eq!(policy(0, 300).delay(7), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn delay_is_monotonic_and_bounded(base in 0u64..10_000, max in 1u64..600, n in 0u32..64) {
            let p = policy(base, max);
            prop_assert!(p.delay(n) <= p.max);
            prop_assert!(p.delay(n) <= p.delay(n + 1));
        }
    }
}
