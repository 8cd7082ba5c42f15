//! Caller-facing admission operations.

pub mod poll;
pub mod service;
pub mod waiting_cache;

pub use poll::StatusPoll;
pub use service::AdmissionService;
pub use waitline_store::RemovalReport;
pub use waiting_cache::WaitingCountCache;
