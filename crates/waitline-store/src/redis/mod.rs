//! Redis queue store.

pub mod client;
pub mod queue;

pub use client::RedisClient;
pub use queue::RedisQueueStore;
