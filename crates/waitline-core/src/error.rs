//! Unified application error types for Waitline.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. Queue-specific failures carry their
//! own [`ErrorKind`] so callers branch on the kind, never on message text.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// No lease exists for the (concert, user) pair.
    TokenNotFound,
    /// The presented token does not match, or the lease is not in an
    /// admitted status.
    TokenInvalid,
    /// The lease exists but its expiry has passed.
    TokenExpired,
    /// The lease has already been extended the maximum number of times.
    ExtensionLimitExceeded,
    /// A stored lease or a script result could not be decoded.
    QueueDataCorruption,
    /// A scheduler could not take its per-tenant lock. Treated as a skip.
    LockUnavailable,
    /// A rate limit was exceeded.
    RateLimit,
    /// Input validation failed.
    Validation,
    /// The backing key-value store failed.
    Store,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
    /// An internal error occurred.
    Internal,
}

/// What a caller should do after receiving an error of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAction {
    /// The admission is gone or unusable; start the queue flow again.
    ReEnterQueue,
    /// A transient condition; the same request may succeed shortly.
    RetryLater,
    /// The request cannot succeed as issued.
    Abort,
}

impl ErrorKind {
    /// The caller-facing recovery signal for this kind.
    pub fn client_action(&self) -> ClientAction {
        match self {
            Self::TokenNotFound | Self::TokenInvalid | Self::TokenExpired => {
                ClientAction::ReEnterQueue
            }
            Self::LockUnavailable
            | Self::RateLimit
            | Self::Store
            | Self::ServiceUnavailable => ClientAction::RetryLater,
            Self::ExtensionLimitExceeded
            | Self::QueueDataCorruption
            | Self::Validation
            | Self::Configuration
            | Self::Serialization
            | Self::Internal => ClientAction::Abort,
        }
    }

    /// Whether this kind belongs to the queue token taxonomy.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFound
                | Self::TokenInvalid
                | Self::TokenExpired
                | Self::ExtensionLimitExceeded
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenNotFound => write!(f, "TOKEN_NOT_FOUND"),
            Self::TokenInvalid => write!(f, "TOKEN_INVALID"),
            Self::TokenExpired => write!(f, "TOKEN_EXPIRED"),
            Self::ExtensionLimitExceeded => write!(f, "EXTENSION_LIMIT_EXCEEDED"),
            Self::QueueDataCorruption => write!(f, "QUEUE_DATA_CORRUPTION"),
            Self::LockUnavailable => write!(f, "LOCK_UNAVAILABLE"),
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Store => write!(f, "STORE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::ServiceUnavailable => write!(f, "SERVICE_UNAVAILABLE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error used throughout Waitline.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// No lease exists for the pair.
    pub fn token_not_found(concert_id: &str, user_id: &str) -> Self {
        Self::new(
            ErrorKind::TokenNotFound,
            format!("No queue token for concert '{concert_id}', user '{user_id}'"),
        )
    }

    /// Wrong token presented or lease not admitted.
    pub fn token_invalid(concert_id: &str, user_id: &str) -> Self {
        Self::new(
            ErrorKind::TokenInvalid,
            format!("Invalid queue token for concert '{concert_id}', user '{user_id}'"),
        )
    }

    /// Lease expired.
    pub fn token_expired(concert_id: &str, user_id: &str) -> Self {
        Self::new(
            ErrorKind::TokenExpired,
            format!("Queue token expired for concert '{concert_id}', user '{user_id}'"),
        )
    }

    /// Extension cap reached.
    pub fn extension_limit_exceeded(concert_id: &str, user_id: &str) -> Self {
        Self::new(
            ErrorKind::ExtensionLimitExceeded,
            format!("Extension limit reached for concert '{concert_id}', user '{user_id}'"),
        )
    }

    /// Stored data could not be decoded.
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueueDataCorruption, message)
    }

    /// Per-tenant scheduler lock is held elsewhere.
    pub fn lock_unavailable(scheduler: &str, concert_id: &str) -> Self {
        Self::new(
            ErrorKind::LockUnavailable,
            format!("Lock '{scheduler}' for concert '{concert_id}' is held by another instance"),
        )
    }

    /// Create a rate-limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a service-unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Shorthand for the caller recovery signal of this error's kind.
    pub fn client_action(&self) -> ClientAction {
        self.kind.client_action()
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::with_source(
            ErrorKind::Validation,
            format!("Validation failed: {err}"),
            err,
        )
    }
}
