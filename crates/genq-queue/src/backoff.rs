//! Backoff calculation for rate-limited requests

use std::time::Duration;

use rand::Rng;

use crate::config::QueueConfig;

/// Floor applied to every computed delay.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Pure delay calculator for rate-limit retries.
///
/// A server-supplied wait hint overrides the exponential base. Jitter of
/// 10-30% of the base is always added so concurrent retries spread out
/// instead of reconverging on the same instant.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            initial: config.initial_backoff,
            multiplier: config.backoff_multiplier,
            max: config.max_backoff,
        }
    }

    /// Delay before the `retry_count`-th retry (1-indexed).
    ///
    /// base = server hint, or `min(initial * multiplier^retry_count, max)`;
    /// returned delay = base + uniform(0.1, 0.3) * base, never zero.
    pub fn delay(&self, retry_count: u32, server_hint: Option<Duration>) -> Duration {
        let base = match server_hint {
            Some(hint) => hint,
            None => {
                let scaled = self.initial.as_secs_f64() * self.multiplier.powi(retry_count as i32);
                Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
            }
        };

        let jitter = base.mul_f64(rand::thread_rng().gen_range(0.1..=0.3));
        (base + jitter).max(MIN_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(60),
        }
    }

    #[test]
    fn exponential_base_with_jitter_bounds() {
        let policy = policy();
        for retry_count in 1..=5u32 {
            let base = Duration::from_secs_f64(1.0 * 2.0f64.powi(retry_count as i32));
            let delay = policy.delay(retry_count, None);
            assert!(delay > base, "delay must exceed the base");
            assert!(delay <= base.mul_f64(1.3), "jitter capped at 30%");
        }
    }

    #[test]
    fn delay_grows_with_retry_count() {
        let policy = policy();
        // With multiplier 2 the next step's jitter floor (2.2x base)
        // clears the prior step's ceiling (1.3x base), so successive
        // delays grow strictly even with random jitter.
        for retry_count in 1..=5u32 {
            let current = policy.delay(retry_count, None);
            let next = policy.delay(retry_count + 1, None);
            assert!(next > current, "retry {retry_count}: {next:?} <= {current:?}");
        }
    }

    #[test]
    fn server_hint_overrides_exponential_base() {
        let policy = policy();
        let hint = Duration::from_secs(17);
        let delay = policy.delay(1, Some(hint));
        assert!(delay > hint);
        assert!(delay <= hint.mul_f64(1.3));
    }

    #[test]
    fn capped_at_max_backoff_plus_jitter() {
        let policy = policy();
        // 2^20 seconds is far past the cap.
        let delay = policy.delay(20, None);
        assert!(delay <= policy.max.mul_f64(1.3));
    }

    #[test]
    fn never_zero() {
        let policy = policy();
        let delay = policy.delay(1, Some(Duration::ZERO));
        assert!(delay > Duration::ZERO);
    }
}
