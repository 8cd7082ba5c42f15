//! In-process queue store.

pub mod queue;
mod sorted;

pub use queue::MemoryQueueStore;
