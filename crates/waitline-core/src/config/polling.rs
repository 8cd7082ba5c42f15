//! Status polling and rate limiting configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Polling pacing hints and token-bucket parameters for the status path.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PollingConfig {
    /// Suggested delay for clients at or near the head of the queue.
    #[serde(default = "default_fast_interval")]
    pub fast_interval_ms: u64,
    /// Suggested delay for clients further back.
    #[serde(default = "default_slow_interval")]
    pub slow_interval_ms: u64,
    /// Positions at or below this value poll at the fast interval.
    #[serde(default = "default_fast_threshold")]
    pub fast_threshold: u64,
    /// Floor applied to every suggested delay.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,
    /// Token bucket capacity (maximum burst).
    #[serde(default = "default_rate_limit_capacity")]
    #[validate(range(min = 1))]
    pub rate_limit_capacity: u32,
    /// Token bucket refill rate in tokens per second.
    #[serde(default = "default_rate_limit_refill_rate")]
    #[validate(range(exclusive_min = 0.0))]
    pub rate_limit_refill_rate: f64,
}

impl PollingConfig {
    /// Seconds until one token regenerates, rounded up.
    pub fn retry_after_seconds(&self) -> u64 {
        (1.0 / self.rate_limit_refill_rate).ceil() as u64
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: default_fast_interval(),
            slow_interval_ms: default_slow_interval(),
            fast_threshold: default_fast_threshold(),
            min_interval_ms: default_min_interval(),
            rate_limit_capacity: default_rate_limit_capacity(),
            rate_limit_refill_rate: default_rate_limit_refill_rate(),
        }
    }
}

fn default_fast_interval() -> u64 {
    1000
}

fn default_slow_interval() -> u64 {
    5000
}

fn default_fast_threshold() -> u64 {
    100
}

fn default_min_interval() -> u64 {
    500
}

fn default_rate_limit_capacity() -> u32 {
    10
}

fn default_rate_limit_refill_rate() -> f64 {
    5.0
}
