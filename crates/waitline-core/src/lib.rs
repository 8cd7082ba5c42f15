//! # waitline-core
//!
//! Core crate for Waitline, the concert admission queue. Contains the
//! configuration schemas, tenant/user identifiers, the injectable clock,
//! and the unified error system shared by every other crate.
//!
//! This crate has **no** internal dependencies on other Waitline crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::{AppError, ClientAction, ErrorKind};
pub use result::AppResult;
