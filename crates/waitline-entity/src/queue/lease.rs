//! Admission lease and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waitline_core::AppResult;
use waitline_core::error::AppError;
use waitline_core::types::{ConcertId, UserId, truncate_to_millis};

use super::status::QueueStatus;

/// The admission credential granted to a promoted user.
///
/// A lease is an immutable value. Transitions return a new lease that the
/// caller must persist through the queue store. Expiries are held at
/// millisecond precision so a lease reads back exactly as it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Tenant the lease belongs to.
    pub concert_id: ConcertId,
    /// Holder of the lease.
    pub user_id: UserId,
    /// Opaque credential presented on protected calls.
    pub token: String,
    /// `Ready`, `Active` or `Expired`.
    pub status: QueueStatus,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Successful extensions so far.
    pub extend_count: u32,
}

impl Lease {
    /// A freshly promoted lease.
    pub fn ready(
        concert_id: ConcertId,
        user_id: UserId,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            concert_id,
            user_id,
            token,
            status: QueueStatus::Ready,
            expires_at: truncate_to_millis(expires_at),
            extend_count: 0,
        }
    }

    /// `now` is strictly past the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The lease is `Ready` or `Active`.
    pub fn is_active(&self) -> bool {
        self.status.is_admitted()
    }

    /// Admitted and not yet expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && !self.is_expired(now)
    }

    /// Another extension is allowed under `max_extensions`.
    pub fn can_extend(&self, max_extensions: u32) -> bool {
        self.extend_count < max_extensions
    }

    /// Check the presented token against this lease.
    ///
    /// A mismatched token is reported as invalid before expiry is looked at,
    /// so a wrong guess never reveals whether the real lease has expired.
    pub fn ensure_valid_for(&self, presented: &str, now: DateTime<Utc>) -> AppResult<()> {
        if presented != self.token || !self.is_active() {
            return Err(self.invalid());
        }
        if self.is_expired(now) {
            return Err(AppError::token_expired(
                self.concert_id.as_str(),
                self.user_id.as_str(),
            ));
        }
        Ok(())
    }

    /// Check that one more extension is permitted.
    pub fn ensure_can_extend(&self, max_extensions: u32) -> AppResult<()> {
        if !self.can_extend(max_extensions) {
            return Err(AppError::extension_limit_exceeded(
                self.concert_id.as_str(),
                self.user_id.as_str(),
            ));
        }
        if !self.is_active() {
            return Err(self.invalid());
        }
        Ok(())
    }

    /// The lease after one more extension.
    pub fn with_extension(&self, new_expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at: truncate_to_millis(new_expires_at),
            extend_count: self.extend_count + 1,
            ..self.clone()
        }
    }

    /// The lease after a `Ready -> Active` transition.
    pub fn activated(&self, new_expires_at: DateTime<Utc>) -> Self {
        Self {
            status: QueueStatus::Active,
            expires_at: truncate_to_millis(new_expires_at),
            ..self.clone()
        }
    }

    fn invalid(&self) -> AppError {
        AppError::token_invalid(self.concert_id.as_str(), self.user_id.as_str())
    }
}
