//! Queue status enumeration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use waitline_core::AppError;

/// Where a user stands in the admission flow.
///
/// `Waiting` and `NotFound` are views only; a stored lease is always
/// `Ready`, `Active` or `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    /// In the wait list, no lease yet.
    Waiting,
    /// Promoted; the lease must be activated before it expires.
    Ready,
    /// Activated and usable for protected calls.
    Active,
    /// The lease lifetime has elapsed.
    Expired,
    /// Neither waiting nor holding a lease.
    NotFound,
}

impl QueueStatus {
    /// Statuses that admit the holder (`Ready` or `Active`).
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Ready | Self::Active)
    }

    /// Whether this status may be written into a stored lease.
    pub fn is_storable(&self) -> bool {
        matches!(self, Self::Ready | Self::Active | Self::Expired)
    }

    /// Return the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Ready => "READY",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(Self::Waiting),
            "READY" => Ok(Self::Ready),
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "NOT_FOUND" => Ok(Self::NotFound),
            other => Err(AppError::data_corruption(format!(
                "Unknown queue status '{other}'"
            ))),
        }
    }
}
