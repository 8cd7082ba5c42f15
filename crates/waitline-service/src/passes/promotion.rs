//! Wait-to-active promotion for one concert.

use std::sync::Arc;

use chrono::TimeDelta;
use serde::Serialize;
use tracing::{debug, info};

use waitline_core::AppResult;
use waitline_core::config::AppConfig;
use waitline_core::types::{ConcertId, SharedClock};
use waitline_entity::QueuePosition;
use waitline_store::QueueStore;

/// Result of one promotion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    /// Capacity minus active entries at the start of the pass.
    pub free_slots: u64,
    /// Users promoted to READY.
    pub moved: u64,
    /// Users still waiting after the pass.
    pub remaining_waiting: u64,
}

/// Moves the head of the wait queue into the active set while capacity
/// allows, issuing a READY lease per promoted user.
#[derive(Debug, Clone)]
pub struct PromotionPass {
    store: Arc<dyn QueueStore>,
    clock: SharedClock,
    capacity: u32,
    ready_ttl: TimeDelta,
    interval_seconds: u64,
}

impl PromotionPass {
    /// Creates a new promotion pass.
    pub fn new(store: Arc<dyn QueueStore>, clock: SharedClock, config: &AppConfig) -> Self {
        Self {
            store,
            clock,
            capacity: config.queue.active_max_size,
            ready_ttl: config.queue.ready_ttl(),
            interval_seconds: config.scheduler.activation_interval_seconds(),
        }
    }

    /// Run one pass for `concert_id`.
    ///
    /// The store re-checks free capacity atomically, so an overlapping pass
    /// on another instance can shrink the batch but never overfill the
    /// active set.
    pub async fn run(&self, concert_id: &ConcertId) -> AppResult<PromotionReport> {
        let capacity = u64::from(self.capacity);
        let active = self.store.active_size(concert_id).await?;
        let free_slots = capacity.saturating_sub(active);

        if free_slots == 0 {
            debug!(concert_id = %concert_id, active, "Active set full, nothing to promote");
            return Ok(PromotionReport {
                free_slots,
                moved: 0,
                remaining_waiting: self.store.wait_size(concert_id).await?,
            });
        }

        let now = self.clock.now();
        let moved = self
            .store
            .migrate_wait_to_active(concert_id, free_slots, capacity, now + self.ready_ttl, now)
            .await?;
        let moved = moved.len() as u64;
        let remaining_waiting = self.store.wait_size(concert_id).await?;

        if moved > 0 {
            let throughput = moved as f64 / self.interval_seconds.max(1) as f64;
            let tail_wait_seconds = QueuePosition::estimate_wait_seconds(
                remaining_waiting,
                self.capacity,
                self.interval_seconds,
            );
            info!(
                concert_id = %concert_id,
                moved,
                free_slots,
                remaining_waiting,
                throughput_per_second = throughput,
                tail_wait_seconds,
                "Promoted waiting users"
            );
        }

        Ok(PromotionReport {
            free_slots,
            moved,
            remaining_waiting,
        })
    }
}

#[cfg(test)]
mod tests {
    use waitline_core::types::{Clock, ManualClock, UserId};
    use waitline_entity::QueueStatus;
    use waitline_store::memory::MemoryQueueStore;

    use super::*;

    fn setup(capacity: u32) -> (PromotionPass, Arc<MemoryQueueStore>, ManualClock) {
        let mut config = AppConfig::default();
        config.queue.active_max_size = capacity;
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryQueueStore::new());
        let pass = PromotionPass::new(store.clone(), Arc::new(clock.clone()), &config);
        (pass, store, clock)
    }

    #[tokio::test]
    async fn test_promotes_up_to_capacity_in_arrival_order() {
        let (pass, store, clock) = setup(2);
        let concert = ConcertId::new("c1").unwrap();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let at = clock.now() + TimeDelta::milliseconds(i as i64);
            store.enter(&concert, &UserId::new(*id).unwrap(), at).await.unwrap();
        }

        let report = pass.run(&concert).await.unwrap();
        assert_eq!(
            report,
            PromotionReport {
                free_slots: 2,
                moved: 2,
                remaining_waiting: 1,
            }
        );

        let a = store
            .get_lease(&concert, &UserId::new("a").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.status, QueueStatus::Ready);
        assert_eq!(
            a.expires_at.timestamp_millis(),
            (clock.now() + TimeDelta::seconds(300)).timestamp_millis()
        );
        assert_eq!(
            store.wait_rank(&concert, &UserId::new("c").unwrap()).await.unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_full_active_set_is_noop() {
        let (pass, store, clock) = setup(1);
        let concert = ConcertId::new("c1").unwrap();
        let now = clock.now();
        store.enter(&concert, &UserId::new("a").unwrap(), now).await.unwrap();
        store
            .enter(&concert, &UserId::new("b").unwrap(), now + TimeDelta::milliseconds(1))
            .await
            .unwrap();
        pass.run(&concert).await.unwrap();

        let report = pass.run(&concert).await.unwrap();
        assert_eq!(report.free_slots, 0);
        assert_eq!(report.moved, 0);
        assert_eq!(report.remaining_waiting, 1);
        assert_eq!(store.active_size(&concert).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_moves_nothing() {
        let (pass, _store, _clock) = setup(5);
        let concert = ConcertId::new("quiet").unwrap();
        let report = pass.run(&concert).await.unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.remaining_waiting, 0);
    }
}
