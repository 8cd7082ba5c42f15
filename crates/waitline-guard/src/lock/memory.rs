//! Process-local TTL lock.
//!
//! Same contract as the Redis lock (owner token, TTL, compare-and-delete
//! release) but scoped to one process. Peers created with [`MemoryLock::peer`]
//! share the lock table and stand in for other instances.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use waitline_core::types::ConcertId;

use super::SchedulerLock;

#[derive(Debug, Clone)]
struct Holder {
    owner: String,
    expires_at: Instant,
}

/// In-process lock table with per-entry owner and expiry.
#[derive(Debug, Clone)]
pub struct MemoryLock {
    /// Shared lock table keyed by `scheduler:concert`.
    table: Arc<DashMap<String, Holder>>,
    /// Owner id of this instance.
    owner: String,
    /// Lock lifetime.
    ttl: Duration,
}

impl MemoryLock {
    /// A lock with a fresh table.
    pub fn new(ttl: Duration) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            owner: Uuid::new_v4().to_string(),
            ttl,
        }
    }

    /// Another owner over the same table.
    pub fn peer(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            owner: Uuid::new_v4().to_string(),
            ttl: self.ttl,
        }
    }

    fn key(scheduler: &str, concert_id: &ConcertId) -> String {
        format!("{scheduler}:{concert_id}")
    }
}

#[async_trait]
impl SchedulerLock for MemoryLock {
    async fn try_acquire(&self, scheduler: &str, concert_id: &ConcertId) -> bool {
        let now = Instant::now();
        let holder = Holder {
            owner: self.owner.clone(),
            expires_at: now + self.ttl,
        };

        match self.table.entry(Self::key(scheduler, concert_id)) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at <= now {
                    entry.insert(holder);
                    true
                } else {
                    debug!(scheduler, concert_id = %concert_id, "Lock held elsewhere");
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(holder);
                true
            }
        }
    }

    async fn release(&self, scheduler: &str, concert_id: &ConcertId) {
        let key = Self::key(scheduler, concert_id);
        if self
            .table
            .remove_if(&key, |_, holder| holder.owner == self.owner)
            .is_none()
        {
            debug!(scheduler, concert_id = %concert_id, "Lock not owned at release");
        }
    }
}
