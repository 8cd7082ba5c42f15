//! Short-lived cache of wait-list sizes.
//!
//! Display only: feeds `total_waiting` and wait estimates. Admission and
//! capacity decisions always read the store directly.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use waitline_core::AppResult;
use waitline_core::types::ConcertId;
use waitline_store::QueueStore;

/// Upper bound on cached tenants.
const MAX_TENANTS: u64 = 10_000;

/// Per-tenant waiting counts with a short TTL.
#[derive(Debug, Clone)]
pub struct WaitingCountCache {
    /// The underlying moka cache, absent when caching is disabled.
    cache: Option<Cache<ConcertId, u64>>,
}

impl WaitingCountCache {
    /// A cache whose entries live for `ttl`. A zero TTL disables caching.
    pub fn new(ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(MAX_TENANTS)
                .time_to_live(ttl)
                .build()
        });
        Self { cache }
    }

    /// Cached count, loading from the store on a miss.
    pub async fn get_or_load(
        &self,
        concert_id: &ConcertId,
        store: &Arc<dyn QueueStore>,
    ) -> AppResult<u64> {
        let Some(cache) = &self.cache else {
            return store.wait_size(concert_id).await;
        };
        cache
            .try_get_with(concert_id.clone(), store.wait_size(concert_id))
            .await
            .map_err(|e| (*e).clone())
    }

    /// Store a count observed elsewhere (e.g. returned by enter).
    pub async fn record(&self, concert_id: &ConcertId, total: u64) {
        if let Some(cache) = &self.cache {
            cache.insert(concert_id.clone(), total).await;
        }
    }
}
