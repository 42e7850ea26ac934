//! Retry policy: attempt ceiling and backoff delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the drain loop does right after scheduling a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Sleep for the backoff before touching the next task.
    /// Retries serialize the whole queue (upload queue).
    Serial,

    /// Re-append and move on; the backoff gate is checked on every pop
    /// (notification queue).
    Requeue,
}

/// Retry policy of one queue instance.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_attempts: u32,

    /// Delay unit for the first retry.
    pub base_delay: Duration,

    /// Upper bound of any single backoff.
    pub max_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Pause between eligibility checks while every task is backing off.
    pub poll_interval: Duration,

    pub mode: RetryMode,
}

impl RetryPolicy {
    /// Upload queue defaults: 3 retries, 2s escalating, serial.
    pub fn uploads() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            poll_interval: Duration::from_secs(1),
            mode: RetryMode::Serial,
        }
    }

    /// Notification queue defaults: 3 retries, 1s base, requeue.
    pub fn notifications() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            poll_interval: Duration::from_secs(1),
            mode: RetryMode::Requeue,
        }
    }

    /// Backoff before the next attempt.
    ///
    /// `attempts` is the failure count after the increment, so the first
    /// retry waits `base * multiplier`:
    ///
    /// delay = min(base_delay * multiplier^attempts, max_delay)
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exp = i32::try_from(attempts).unwrap_or(i32::MAX);
        let delay_secs = base_secs * self.multiplier.powi(exp);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}
