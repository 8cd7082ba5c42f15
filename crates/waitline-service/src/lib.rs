//! # waitline-service
//!
//! Business logic for the admission queue. [`AdmissionService`] is the
//! caller-facing API (enter, status, activate, extend, validate, remove,
//! rate-limited polling); [`PromotionPass`] and [`CleanupPass`] hold the
//! per-tenant work the background scheduler runs.

pub mod admission;
pub mod passes;

pub use admission::{AdmissionService, RemovalReport, StatusPoll};
pub use passes::{CleanupPass, PromotionPass, PromotionReport};
