//! Convenience result type alias for Waitline.

use crate::error::AppError;

/// A specialized `Result` type for Waitline operations.
pub type AppResult<T> = Result<T, AppError>;
