//! Newtype wrappers for tenant and user identifiers.
//!
//! Identifiers are embedded in store keys inside a `{...}` hash tag, so
//! anything that would break the tag (braces) or the key layout (empty
//! strings, whitespace) is rejected at construction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Longest identifier accepted.
pub const MAX_ID_LEN: usize = 128;

/// Macro to define a validated string identifier.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Result<Self, AppError> {
                let raw = raw.into();
                check_id($label, &raw)?;
                Ok(Self(raw))
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = AppError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Tenant identifier. Every queue structure is scoped to one concert.
    ConcertId, "concert id"
);
define_id!(
    /// Caller identifier within a tenant.
    UserId, "user id"
);

fn check_id(label: &str, raw: &str) -> Result<(), AppError> {
    if raw.is_empty() {
        return Err(AppError::validation(format!("{label} must not be empty")));
    }
    if raw.len() > MAX_ID_LEN {
        return Err(AppError::validation(format!(
            "{label} exceeds {MAX_ID_LEN} bytes"
        )));
    }
    if raw
        .chars()
        .any(|c| c == '{' || c == '}' || c.is_whitespace() || c.is_control())
    {
        return Err(AppError::validation(format!(
            "{label} '{raw}' contains a forbidden character"
        )));
    }
    Ok(())
}
