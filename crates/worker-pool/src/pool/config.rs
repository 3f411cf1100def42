//! Worker pool configuration

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::PoolError;
use crate::util::duration_millis;

/// Worker pool configuration
///
/// Checked by [`WorkerPoolConfig::validate`] when the pool is built; an
/// invalid value is rejected immediately rather than clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of workers kept alive
    pub worker_count: usize,

    /// How long a single attempt may stay outstanding
    #[serde(with = "duration_millis")]
    pub task_timeout: Duration,

    /// Retries after the first failed attempt
    pub max_retries: u32,

    /// Queue length at which a queue-full event is emitted (advisory)
    pub max_queue_size: usize,

    /// Metrics event interval
    #[serde(with = "duration_millis")]
    pub monitor_interval: Duration,

    /// Stale sweep interval
    #[serde(with = "duration_millis")]
    pub cleanup_interval: Duration,

    /// A task is stale after this many timeouts
    pub stale_factor: u32,

    /// Consecutive send failures before a worker is replaced
    pub max_send_failures: u32,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            task_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_queue_size: 1000,
            monitor_interval: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60),
            stale_factor: 2,
            max_send_failures: 3,
        }
    }
}

impl WorkerPoolConfig {
    /// Load from `WORKER_POOL_*` environment variables
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            worker_count: env_or("WORKER_POOL_WORKERS", defaults.worker_count),
            task_timeout: env_millis_or("WORKER_POOL_TASK_TIMEOUT_MS", defaults.task_timeout),
            max_retries: env_or("WORKER_POOL_MAX_RETRIES", defaults.max_retries),
            max_queue_size: env_or("WORKER_POOL_MAX_QUEUE_SIZE", defaults.max_queue_size),
            monitor_interval: env_millis_or(
                "WORKER_POOL_MONITOR_INTERVAL_MS",
                defaults.monitor_interval,
            ),
            cleanup_interval: env_millis_or(
                "WORKER_POOL_CLEANUP_INTERVAL_MS",
                defaults.cleanup_interval,
            ),
            ..defaults
        }
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_stale_factor(mut self, factor: u32) -> Self {
        self.stale_factor = factor;
        self
    }

    pub fn with_max_send_failures(mut self, failures: u32) -> Self {
        self.max_send_failures = failures;
        self
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<(), PoolError> {
        let invalid = |msg: &str| Err(PoolError::InvalidConfig(msg.to_string()));

        if self.worker_count == 0 {
            return invalid("worker_count must be a positive integer");
        }
        if self.task_timeout.is_zero() {
            return invalid("task_timeout must be positive");
        }
        if self.max_queue_size == 0 {
            return invalid("max_queue_size must be a positive integer");
        }
        if self.monitor_interval.is_zero() {
            return invalid("monitor_interval must be positive");
        }
        if self.cleanup_interval.is_zero() {
            return invalid("cleanup_interval must be positive");
        }
        if self.stale_factor == 0 {
            return invalid("stale_factor must be at least 1");
        }
        if self.max_send_failures == 0 {
            return invalid("max_send_failures must be at least 1");
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_millis_or(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
