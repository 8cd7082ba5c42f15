//! Expired lease reclamation for one concert.

use std::sync::Arc;

use tracing::{debug, info};

use waitline_core::AppResult;
use waitline_core::types::{ConcertId, SharedClock};
use waitline_store::QueueStore;

/// Removes every lease whose expiry is at or before now, freeing its slot.
#[derive(Debug, Clone)]
pub struct CleanupPass {
    store: Arc<dyn QueueStore>,
    clock: SharedClock,
}

impl CleanupPass {
    /// Creates a new cleanup pass.
    pub fn new(store: Arc<dyn QueueStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Returns the number of reclaimed leases.
    pub async fn run(&self, concert_id: &ConcertId) -> AppResult<u64> {
        let removed = self
            .store
            .reclaim_expired(concert_id, self.clock.now())
            .await?;

        if removed > 0 {
            info!(concert_id = %concert_id, removed, "Reclaimed expired leases");
        } else {
            debug!(concert_id = %concert_id, "No expired leases");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use waitline_core::types::{Clock, ManualClock, UserId};
    use waitline_store::memory::MemoryQueueStore;

    use super::*;

    #[tokio::test]
    async fn test_reclaims_only_expired_leases() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryQueueStore::new());
        let pass = CleanupPass::new(store.clone(), Arc::new(clock.clone()));
        let concert = ConcertId::new("c1").unwrap();

        let now = clock.now();
        store.enter(&concert, &UserId::new("a").unwrap(), now).await.unwrap();
        store
            .enter(&concert, &UserId::new("b").unwrap(), now + TimeDelta::milliseconds(1))
            .await
            .unwrap();
        store
            .migrate_wait_to_active(&concert, 1, 10, now + TimeDelta::seconds(10), now)
            .await
            .unwrap();
        store
            .migrate_wait_to_active(&concert, 1, 10, now + TimeDelta::seconds(60), now)
            .await
            .unwrap();

        assert_eq!(pass.run(&concert).await.unwrap(), 0);

        clock.advance(TimeDelta::seconds(10));
        assert_eq!(pass.run(&concert).await.unwrap(), 1);
        let a = store.get_lease(&concert, &UserId::new("a").unwrap()).await.unwrap();
        let b = store.get_lease(&concert, &UserId::new("b").unwrap()).await.unwrap();
        assert!(a.is_none());
        assert!(b.is_some());
        assert_eq!(store.active_size(&concert).await.unwrap(), 1);
    }
}
