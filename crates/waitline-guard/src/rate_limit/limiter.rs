//! Fail-open rate limiter for the status-polling path.

use std::sync::Arc;

use tracing::{debug, info, warn};

use waitline_core::AppResult;
use waitline_core::config::{PollingConfig, StoreBackend, StoreConfig};
use waitline_core::types::{ConcertId, SharedClock, UserId};
use waitline_store::QueueKeys;

use super::RateLimitBackend;
use super::memory::MemoryTokenBucket;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The request may proceed.
    Allowed,
    /// The bucket is empty; retry after the given number of seconds.
    Denied {
        /// Seconds until one token regenerates.
        retry_after_seconds: u64,
    },
}

impl RateLimitDecision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Token-bucket limiter keyed by `(concert, user)`.
///
/// Store faults allow the request: status polling stays available during
/// an outage at the cost of strict enforcement.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Bucket storage.
    backend: Arc<dyn RateLimitBackend>,
    /// Bucket key layout.
    keys: QueueKeys,
    /// Maximum burst.
    capacity: u32,
    /// Tokens per second.
    refill_rate: f64,
    /// Time source.
    clock: SharedClock,
}

impl RateLimiter {
    /// Creates a limiter over an existing backend.
    pub fn new(
        backend: Arc<dyn RateLimitBackend>,
        keys: QueueKeys,
        polling: &PollingConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            backend,
            keys,
            capacity: polling.rate_limit_capacity,
            refill_rate: polling.rate_limit_refill_rate,
            clock,
        }
    }

    /// Build the limiter whose bucket storage matches the store backend.
    pub async fn from_config(
        polling: &PollingConfig,
        store: &StoreConfig,
        clock: SharedClock,
    ) -> AppResult<Self> {
        let keys = QueueKeys::new(store.redis.key_prefix.clone());
        let backend: Arc<dyn RateLimitBackend> = match store.backend {
            #[cfg(feature = "redis-backend")]
            StoreBackend::Redis => {
                let client = waitline_store::redis::RedisClient::connect(&store.redis).await?;
                Arc::new(super::redis::RedisTokenBucket::new(client))
            }
            #[allow(unreachable_patterns)]
            _ => Arc::new(MemoryTokenBucket::new()),
        };
        info!(
            capacity = polling.rate_limit_capacity,
            refill_rate = polling.rate_limit_refill_rate,
            "Status poll rate limiter initialized"
        );
        Ok(Self::new(backend, keys, polling, clock))
    }

    /// Seconds for one token to regenerate, rounded up.
    pub fn retry_after_seconds(&self) -> u64 {
        (1.0 / self.refill_rate).ceil() as u64
    }

    /// Consume one token for the pair, allowing on store failure.
    pub async fn check(&self, concert_id: &ConcertId, user_id: &UserId) -> RateLimitDecision {
        let key = self.keys.rate_limit(concert_id.as_str(), user_id.as_str());
        let now_ms = self.clock.now_millis();

        match self
            .backend
            .try_consume(&key, self.capacity, self.refill_rate, now_ms)
            .await
        {
            Ok(true) => RateLimitDecision::Allowed,
            Ok(false) => {
                debug!(concert_id = %concert_id, user_id = %user_id, "Status poll throttled");
                RateLimitDecision::Denied {
                    retry_after_seconds: self.retry_after_seconds(),
                }
            }
            Err(e) => {
                warn!(
                    concert_id = %concert_id,
                    user_id = %user_id,
                    error = %e,
                    "Rate limiter unavailable, allowing request"
                );
                RateLimitDecision::Allowed
            }
        }
    }
}
