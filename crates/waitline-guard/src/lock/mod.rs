//! Scheduler lock strategies.

pub mod memory;
pub mod noop;
#[cfg(feature = "redis-backend")]
pub mod redis;

use async_trait::async_trait;
use tracing::{info, warn};

use waitline_core::AppResult;
use waitline_core::config::{LockConfig, LockStrategy, StoreBackend, StoreConfig};
use waitline_core::types::ConcertId;

pub use self::memory::MemoryLock;
pub use self::noop::NoopLock;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisLock;

/// Per-tenant mutual exclusion for a named scheduler pass.
///
/// Failing to acquire is not an error: it means another instance is already
/// running that pass for that tenant. Implementations swallow their own
/// infrastructure faults into `false` and log them.
#[async_trait]
pub trait SchedulerLock: Send + Sync + std::fmt::Debug {
    /// Try to take the lock. Never blocks waiting for a holder.
    async fn try_acquire(&self, scheduler: &str, concert_id: &ConcertId) -> bool;

    /// Release the lock if this instance still owns it.
    async fn release(&self, scheduler: &str, concert_id: &ConcertId);
}

/// Dispatcher for lock strategies.
///
/// Switches between the no-op and the clustered locks based on configuration.
#[derive(Debug, Clone)]
pub enum SchedulerLockDispatch {
    /// Always grants (single scheduler process).
    Noop(NoopLock),
    /// Process-local TTL lock (memory store backend).
    Memory(MemoryLock),
    /// Redis TTL lock shared by every instance.
    #[cfg(feature = "redis-backend")]
    Redis(RedisLock),
}

impl SchedulerLockDispatch {
    /// Build the lock described by configuration.
    pub async fn from_config(lock: &LockConfig, store: &StoreConfig) -> AppResult<Self> {
        match (lock.strategy, store.backend) {
            (LockStrategy::None, _) => {
                info!("Scheduler lock strategy: none");
                Ok(Self::Noop(NoopLock))
            }
            #[cfg(feature = "redis-backend")]
            (LockStrategy::Cluster, StoreBackend::Redis) => {
                let client = waitline_store::redis::RedisClient::connect(&store.redis).await?;
                info!(ttl_secs = lock.ttl_seconds, "Scheduler lock strategy: cluster (redis)");
                Ok(Self::Redis(RedisLock::new(client, lock.ttl())))
            }
            #[allow(unreachable_patterns)]
            (LockStrategy::Cluster, backend) => {
                warn!(
                    ?backend,
                    "Cluster lock requested without a shared store; locking is process-local"
                );
                Ok(Self::Memory(MemoryLock::new(lock.ttl())))
            }
        }
    }
}

#[async_trait]
impl SchedulerLock for SchedulerLockDispatch {
    async fn try_acquire(&self, scheduler: &str, concert_id: &ConcertId) -> bool {
        match self {
            Self::Noop(l) => l.try_acquire(scheduler, concert_id).await,
            Self::Memory(l) => l.try_acquire(scheduler, concert_id).await,
            #[cfg(feature = "redis-backend")]
            Self::Redis(l) => l.try_acquire(scheduler, concert_id).await,
        }
    }

    async fn release(&self, scheduler: &str, concert_id: &ConcertId) {
        match self {
            Self::Noop(l) => l.release(scheduler, concert_id).await,
            Self::Memory(l) => l.release(scheduler, concert_id).await,
            #[cfg(feature = "redis-backend")]
            Self::Redis(l) => l.release(scheduler, concert_id).await,
        }
    }
}
