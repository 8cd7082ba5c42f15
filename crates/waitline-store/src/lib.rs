//! # waitline-store
//!
//! The queue store adapter. Translates queue operations (enqueue, rank
//! lookup, promotion, lease CRUD, reclamation) into atomic store operations.
//! Two backends implement [`QueueStore`]:
//!
//! - **redis**: sorted sets and hashes driven by Lua scripts, safe for any
//!   number of service instances
//! - **memory**: a single-mutex in-process store with the same atomicity
//!   contract, for single-node runs and tests
//!
//! The backend is selected at runtime by [`QueueStoreManager`].

pub mod codec;
pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;
#[cfg(feature = "redis-backend")]
pub mod scripts;
pub mod store;

pub use keys::QueueKeys;
pub use provider::QueueStoreManager;
pub use store::{ActivationResult, ExtensionResult, QueueStore, RemovalReport};
