//! Per-tenant work run by the background scheduler.
//!
//! Each pass handles exactly one concert. Tenant discovery, locking and
//! cadence belong to the worker crate.

pub mod cleanup;
pub mod promotion;

pub use cleanup::CleanupPass;
pub use promotion::{PromotionPass, PromotionReport};
