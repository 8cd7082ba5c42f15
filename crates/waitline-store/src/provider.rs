//! Queue store manager that dispatches to the configured backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use waitline_core::AppResult;
use waitline_core::config::{QueueConfig, StoreBackend, StoreConfig};
use waitline_core::error::AppError;
use waitline_core::types::{ConcertId, UserId};
use waitline_entity::{EnterOutcome, Lease, QueueStatus};

use crate::store::{ActivationResult, ExtensionResult, QueueStore, RemovalReport};

/// Queue store manager that wraps the configured backend.
///
/// The backend is selected at construction time based on configuration.
#[derive(Debug, Clone)]
pub struct QueueStoreManager {
    /// The inner store.
    inner: Arc<dyn QueueStore>,
}

impl QueueStoreManager {
    /// Create a new store manager from configuration.
    pub async fn new(store: &StoreConfig, queue: &QueueConfig) -> AppResult<Self> {
        let inner: Arc<dyn QueueStore> = match store.backend {
            #[cfg(feature = "redis-backend")]
            StoreBackend::Redis => {
                info!("Initializing Redis queue store");
                let client = crate::redis::RedisClient::connect(&store.redis).await?;
                let grace = Duration::from_secs(queue.lease_key_grace_seconds);
                Arc::new(crate::redis::RedisQueueStore::new(client, grace))
            }
            #[cfg(feature = "memory")]
            StoreBackend::Memory => {
                info!("Initializing in-memory queue store");
                Arc::new(crate::memory::MemoryQueueStore::new())
            }
            #[allow(unreachable_patterns)]
            other => {
                return Err(AppError::configuration(format!(
                    "Queue store backend {other:?} is not compiled in"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a store manager from an existing store (for testing).
    pub fn from_store(store: Arc<dyn QueueStore>) -> Self {
        Self { inner: store }
    }

    /// Get a shared handle to the inner store.
    pub fn shared(&self) -> Arc<dyn QueueStore> {
        Arc::clone(&self.inner)
    }
}

#[async_trait]
impl QueueStore for QueueStoreManager {
    async fn enter(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<EnterOutcome> {
        self.inner.enter(concert_id, user_id, now).await
    }

    async fn add_to_wait(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.inner.add_to_wait(concert_id, user_id, now).await
    }

    async fn wait_rank(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<Option<u64>> {
        self.inner.wait_rank(concert_id, user_id).await
    }

    async fn wait_size(&self, concert_id: &ConcertId) -> AppResult<u64> {
        self.inner.wait_size(concert_id).await
    }

    async fn active_size(&self, concert_id: &ConcertId) -> AppResult<u64> {
        self.inner.active_size(concert_id).await
    }

    async fn pop_batch(&self, concert_id: &ConcertId, n: u64) -> AppResult<Vec<UserId>> {
        self.inner.pop_batch(concert_id, n).await
    }

    async fn remove_from_wait(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<bool> {
        self.inner.remove_from_wait(concert_id, user_id).await
    }

    async fn get_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<Option<Lease>> {
        self.inner.get_lease(concert_id, user_id).await
    }

    async fn create_lease(&self, lease: &Lease, now: DateTime<Utc>) -> AppResult<()> {
        self.inner.create_lease(lease, now).await
    }

    async fn set_status(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        status: QueueStatus,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inner.set_status(concert_id, user_id, status, now).await
    }

    async fn set_expiry(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inner.set_expiry(concert_id, user_id, expires_at, now).await
    }

    async fn increment_extend_count(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<Option<u32>> {
        self.inner.increment_extend_count(concert_id, user_id).await
    }

    async fn remove_lease(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<bool> {
        self.inner.remove_lease(concert_id, user_id).await
    }

    async fn withdraw(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<RemovalReport> {
        self.inner.withdraw(concert_id, user_id).await
    }

    async fn migrate_wait_to_active(
        &self,
        concert_id: &ConcertId,
        n: u64,
        capacity: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<UserId>> {
        self.inner
            .migrate_wait_to_active(concert_id, n, capacity, expires_at, now)
            .await
    }

    async fn activate_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ActivationResult> {
        self.inner
            .activate_lease(concert_id, user_id, new_expires_at, now)
            .await
    }

    async fn extend_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        new_expires_at: DateTime<Utc>,
        max_extensions: u32,
        now: DateTime<Utc>,
    ) -> AppResult<ExtensionResult> {
        self.inner
            .extend_lease(concert_id, user_id, new_expires_at, max_extensions, now)
            .await
    }

    async fn reclaim_expired(&self, concert_id: &ConcertId, now: DateTime<Utc>) -> AppResult<u64> {
        self.inner.reclaim_expired(concert_id, now).await
    }

    async fn active_concerts(&self) -> AppResult<Vec<ConcertId>> {
        self.inner.active_concerts().await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}
