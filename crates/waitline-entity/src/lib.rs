//! # waitline-entity
//!
//! Domain model for the admission queue. Every type in this crate is a pure
//! value object: no I/O, no clocks read implicitly. Time always arrives as an
//! explicit `now` argument so the lease state machine stays deterministic.

pub mod queue;

pub use queue::{
    EnterOutcome, EnterStatus, Lease, QueuePosition, QueueStatus, QueueToken, generate_token,
    mask_token,
};
