//! Queue configuration

use std::time::Duration;

/// Configuration for a [`QueueManager`](crate::QueueManager).
///
/// All values are fixed at construction. `from_env` reads the same
/// variables the deployment environment sets for the rest of the stack.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of requests waiting in the queue.
    pub max_queue_size: usize,
    /// Number of concurrent worker loops.
    pub worker_threads: usize,
    /// Rate-limit retries allowed before a request is failed.
    pub max_retries: u32,
    /// Base delay for the first backoff step.
    pub initial_backoff: Duration,
    /// Exponential growth factor between backoff steps.
    pub backoff_multiplier: f64,
    /// Ceiling on the computed backoff base.
    pub max_backoff: Duration,
    /// Bounded wait used by idle workers between dequeue attempts.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            worker_threads: 4,
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl QueueConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_queue_size: env_parse("MAX_QUEUE_SIZE", defaults.max_queue_size),
            worker_threads: env_parse("WORKER_THREADS", defaults.worker_threads),
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries),
            initial_backoff: env_secs("INITIAL_BACKOFF", defaults.initial_backoff),
            backoff_multiplier: env_parse("BACKOFF_MULTIPLIER", defaults.backoff_multiplier),
            max_backoff: env_secs("MAX_BACKOFF", defaults.max_backoff),
            poll_interval: defaults.poll_interval,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}
