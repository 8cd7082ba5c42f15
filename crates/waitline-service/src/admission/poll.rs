//! Poll pacing.

use serde::Serialize;

use waitline_core::config::PollingConfig;
use waitline_entity::{QueueStatus, QueueToken};

/// Result of a rate-limited status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusPoll {
    /// Current status plus a suggested delay before the next poll.
    Status {
        token: QueueToken,
        next_poll_after_ms: u64,
    },
    /// The caller polled too often.
    Throttled { retry_after_seconds: u64 },
}

/// Suggested delay before the next poll for a given view.
///
/// Admitted users and those near the head poll fast; everyone else slow.
/// Never below the configured floor.
pub fn next_poll_after_ms(view: &QueueToken, polling: &PollingConfig) -> u64 {
    let near_head = match view.status {
        QueueStatus::Ready | QueueStatus::Active => true,
        QueueStatus::Waiting => view.position.is_some_and(|p| p <= polling.fast_threshold),
        QueueStatus::Expired | QueueStatus::NotFound => false,
    };
    let interval = if near_head {
        polling.fast_interval_ms
    } else {
        polling.slow_interval_ms
    };
    interval.max(polling.min_interval_ms)
}
