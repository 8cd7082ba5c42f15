//! Caller-facing view of a user's queue state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waitline_core::types::{ConcertId, UserId};

use super::lease::Lease;
use super::status::QueueStatus;

/// Snapshot returned by status, activate and extend.
///
/// `Waiting` views carry a 1-based position; lease-backed views carry the
/// token, expiry and extension count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueToken {
    pub concert_id: ConcertId,
    pub user_id: UserId,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub extend_count: u32,
}

impl QueueToken {
    /// Waiting at a 1-based `position`.
    pub fn waiting(concert_id: ConcertId, user_id: UserId, position: u64) -> Self {
        Self {
            concert_id,
            user_id,
            status: QueueStatus::Waiting,
            token: None,
            position: Some(position),
            expires_at: None,
            extend_count: 0,
        }
    }

    /// Nothing known for the pair.
    pub fn not_found(concert_id: ConcertId, user_id: UserId) -> Self {
        Self {
            concert_id,
            user_id,
            status: QueueStatus::NotFound,
            token: None,
            position: None,
            expires_at: None,
            extend_count: 0,
        }
    }

    /// View of a stored lease. An elapsed lease reads as `Expired` whatever
    /// its stored status, and an expired view carries no credential.
    pub fn from_lease(lease: &Lease, now: DateTime<Utc>) -> Self {
        let status = if lease.is_expired(now) {
            QueueStatus::Expired
        } else {
            lease.status
        };
        let token = (status != QueueStatus::Expired).then(|| lease.token.clone());
        Self {
            concert_id: lease.concert_id.clone(),
            user_id: lease.user_id.clone(),
            status,
            token,
            position: None,
            expires_at: Some(lease.expires_at),
            extend_count: lease.extend_count,
        }
    }
}
