//! Queue scheduler: runs the per-concert passes across every active concert.

use std::future::Future;
use std::sync::Arc;

use tracing;

use waitline_core::AppResult;
use waitline_core::config::AppConfig;
use waitline_core::error::{AppError, ErrorKind};
use waitline_core::types::{ConcertId, SharedClock};
use waitline_guard::SchedulerLock;
use waitline_service::{CleanupPass, PromotionPass};
use waitline_store::QueueStore;

/// Lock name held while promoting a concert's wait list.
pub const PROMOTION_LOCK: &str = "move";
/// Lock name held while reclaiming a concert's expired leases.
pub const CLEANUP_LOCK: &str = "cleanup";

/// Outcome of one cycle over all active concerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Concerts found by discovery.
    pub concerts: usize,
    /// Concerts whose pass completed.
    pub processed: usize,
    /// Concerts skipped because another instance held the lock.
    pub skipped: usize,
    /// Concerts whose pass failed.
    pub failed: usize,
    /// Users promoted, or leases reclaimed, across all concerts.
    pub affected: u64,
}

/// Runs promotion and cleanup for every concert with queue activity.
///
/// Each concert is processed under its own named lock, so the two passes
/// never block each other and overlapping instances skip rather than
/// double-allocate. A failure on one concert is logged and the cycle moves
/// on to the next.
#[derive(Debug, Clone)]
pub struct QueueScheduler {
    /// Queue store, used for concert discovery
    store: Arc<dyn QueueStore>,
    /// Per-concert lock
    lock: Arc<dyn SchedulerLock>,
    /// Promotion logic
    promotion: PromotionPass,
    /// Cleanup logic
    cleanup: CleanupPass,
}

impl QueueScheduler {
    /// Create a new queue scheduler
    pub fn new(
        store: Arc<dyn QueueStore>,
        lock: Arc<dyn SchedulerLock>,
        clock: SharedClock,
        config: &AppConfig,
    ) -> Self {
        Self {
            promotion: PromotionPass::new(Arc::clone(&store), Arc::clone(&clock), config),
            cleanup: CleanupPass::new(Arc::clone(&store), clock),
            store,
            lock,
        }
    }

    /// Promote waiting users for every active concert.
    pub async fn run_promotion_cycle(&self) -> CycleReport {
        let concerts = match self.discover().await {
            Some(c) => c,
            None => return CycleReport::default(),
        };

        let mut report = CycleReport {
            concerts: concerts.len(),
            ..CycleReport::default()
        };
        for concert_id in &concerts {
            let result = self
                .locked(PROMOTION_LOCK, concert_id, || self.promotion.run(concert_id))
                .await;
            Self::tally(&mut report, PROMOTION_LOCK, concert_id, result.map(|r| r.moved));
        }

        tracing::debug!(
            concerts = report.concerts,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            moved = report.affected,
            "Promotion cycle finished"
        );
        report
    }

    /// Reclaim expired leases for every active concert.
    pub async fn run_cleanup_cycle(&self) -> CycleReport {
        let concerts = match self.discover().await {
            Some(c) => c,
            None => return CycleReport::default(),
        };

        let mut report = CycleReport {
            concerts: concerts.len(),
            ..CycleReport::default()
        };
        for concert_id in &concerts {
            let result = self
                .locked(CLEANUP_LOCK, concert_id, || self.cleanup.run(concert_id))
                .await;
            Self::tally(&mut report, CLEANUP_LOCK, concert_id, result);
        }

        tracing::debug!(
            concerts = report.concerts,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            removed = report.affected,
            "Cleanup cycle finished"
        );
        report
    }

    async fn discover(&self) -> Option<Vec<ConcertId>> {
        match self.store.active_concerts().await {
            Ok(concerts) => Some(concerts),
            Err(e) => {
                tracing::error!(error = %e, "Failed to discover active concerts");
                None
            }
        }
    }

    /// Run `work` while holding `scheduler`'s lock for the concert. The lock
    /// is released whatever the outcome.
    async fn locked<T, F, Fut>(
        &self,
        scheduler: &str,
        concert_id: &ConcertId,
        work: F,
    ) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if !self.lock.try_acquire(scheduler, concert_id).await {
            return Err(AppError::lock_unavailable(scheduler, concert_id.as_str()));
        }
        let result = work().await;
        self.lock.release(scheduler, concert_id).await;
        result
    }

    fn tally(
        report: &mut CycleReport,
        scheduler: &str,
        concert_id: &ConcertId,
        result: AppResult<u64>,
    ) {
        match result {
            Ok(n) => {
                report.processed += 1;
                report.affected += n;
            }
            Err(e) if e.kind == ErrorKind::LockUnavailable => {
                report.skipped += 1;
                tracing::debug!(
                    scheduler,
                    concert_id = %concert_id,
                    "Lock held elsewhere, skipping"
                );
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    scheduler,
                    concert_id = %concert_id,
                    kind = %e.kind,
                    error = %e,
                    "Scheduler pass failed for concert"
                );
            }
        }
    }
}
