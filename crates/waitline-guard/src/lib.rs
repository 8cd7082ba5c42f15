//! # waitline-guard
//!
//! Coordination and protection primitives around the queue:
//!
//! - **lock**: per-tenant mutual exclusion for scheduler passes, either a
//!   no-op (single instance) or an ownership-checked TTL lock (cluster)
//! - **rate_limit**: token-bucket limiter for status polling that fails
//!   open when its backing store is unavailable

pub mod lock;
pub mod rate_limit;

pub use lock::{SchedulerLock, SchedulerLockDispatch};
pub use rate_limit::{RateLimitDecision, RateLimiter};
