//! Background scheduling for Waitline.
//!
//! This crate provides:
//! - A queue scheduler that discovers active concerts and runs the promotion
//!   and cleanup passes for each under a per-concert lock
//! - A runtime that drives both passes on fixed-delay timers until shutdown

pub mod runtime;
pub mod scheduler;

pub use runtime::SchedulerRuntime;
pub use scheduler::{CLEANUP_LOCK, CycleReport, PROMOTION_LOCK, QueueScheduler};
