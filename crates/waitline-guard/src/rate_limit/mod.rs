//! Token-bucket rate limiting for status polling.

pub mod limiter;
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

use async_trait::async_trait;

use waitline_core::AppResult;

pub use self::limiter::{RateLimitDecision, RateLimiter};
pub use self::memory::MemoryTokenBucket;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisTokenBucket;

/// Storage for token buckets.
///
/// One call refills the bucket for the time elapsed since its last check
/// (`min(capacity, tokens + elapsed * refill_rate)`) and then consumes a
/// token if one is available, atomically.
#[async_trait]
pub trait RateLimitBackend: Send + Sync + std::fmt::Debug {
    /// Returns whether a token was consumed.
    async fn try_consume(
        &self,
        key: &str,
        capacity: u32,
        refill_rate: f64,
        now_ms: i64,
    ) -> AppResult<bool>;
}
