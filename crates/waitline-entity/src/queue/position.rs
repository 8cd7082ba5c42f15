//! Enter results.

use serde::{Deserialize, Serialize};

use super::lease::Lease;
use super::view::QueueToken;

/// How an enter call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnterStatus {
    /// Appended to the wait list.
    New,
    /// Already in the wait list; rank unchanged.
    AlreadyWaiting,
    /// Already holds a live lease.
    AlreadyAdmitted,
}

/// Raw store-level result of an atomic enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnterOutcome {
    /// The user is in the wait list at 0-based `rank`.
    Waiting {
        rank: u64,
        total_waiting: u64,
        newly_added: bool,
    },
    /// The user already holds a live `Ready`/`Active` lease.
    Admitted(Lease),
}

/// What enter reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    pub status: EnterStatus,
    /// 1-based position, absent when already admitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    pub total_waiting: u64,
    pub estimated_wait_seconds: u64,
    /// Present when the user already holds a lease.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<QueueToken>,
}

impl QueuePosition {
    /// Seconds until `position` (1-based) is promoted, assuming every
    /// promotion pass frees `capacity` slots.
    pub fn estimate_wait_seconds(position: u64, capacity: u32, interval_seconds: u64) -> u64 {
        if position == 0 || capacity == 0 {
            return 0;
        }
        position.div_ceil(u64::from(capacity)) * interval_seconds
    }
}
