//! Core type definitions used across the Waitline workspace.

pub mod clock;
pub mod id;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, truncate_to_millis};
pub use id::{ConcertId, UserId};
