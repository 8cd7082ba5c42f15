//! Lock strategy for single-instance deployments.

use async_trait::async_trait;

use waitline_core::types::ConcertId;

use super::SchedulerLock;

/// Always grants. Only correct when exactly one scheduler process runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLock;

#[async_trait]
impl SchedulerLock for NoopLock {
    async fn try_acquire(&self, _scheduler: &str, _concert_id: &ConcertId) -> bool {
        true
    }

    async fn release(&self, _scheduler: &str, _concert_id: &ConcertId) {}
}
