//! In-memory token buckets.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use waitline_core::AppResult;

use super::RateLimitBackend;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill_ms: i64,
}

#[derive(Debug, Default)]
struct BucketTable {
    /// Key → bucket state.
    entries: HashMap<String, TokenBucket>,
    /// When idle buckets were last dropped.
    last_sweep_ms: i64,
}

impl BucketTable {
    /// Drop buckets untouched for `idle_ms`. Such a bucket has refilled to
    /// capacity, which is also what a missing bucket starts at.
    fn sweep(&mut self, now_ms: i64, idle_ms: i64) {
        if now_ms - self.last_sweep_ms < idle_ms {
            return;
        }
        self.entries
            .retain(|_, bucket| now_ms - bucket.last_refill_ms < idle_ms);
        self.last_sweep_ms = now_ms;
    }
}

/// Milliseconds for an empty bucket to refill completely.
fn full_after_ms(capacity: f64, refill_rate: f64) -> i64 {
    ((capacity / refill_rate) * 1000.0).ceil() as i64
}

/// Token buckets kept in process memory.
///
/// Buckets idle long enough to be full again are dropped, mirroring the key
/// expiry the Redis buckets carry.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenBucket {
    buckets: Arc<Mutex<BucketTable>>,
}

impl MemoryTokenBucket {
    /// Creates an empty bucket table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buckets currently held.
    pub async fn tracked(&self) -> usize {
        self.buckets.lock().await.entries.len()
    }
}

#[async_trait]
impl RateLimitBackend for MemoryTokenBucket {
    async fn try_consume(
        &self,
        key: &str,
        capacity: u32,
        refill_rate: f64,
        now_ms: i64,
    ) -> AppResult<bool> {
        let mut table = self.buckets.lock().await;
        let capacity = f64::from(capacity);
        table.sweep(now_ms, full_after_ms(capacity, refill_rate));

        let bucket = table.entries.entry(key.to_string()).or_insert(TokenBucket {
            tokens: capacity,
            last_refill_ms: now_ms,
        });

        // Refill tokens
        let elapsed = (now_ms - bucket.last_refill_ms).max(0) as f64 / 1000.0;
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(capacity);
        bucket.last_refill_ms = now_ms.max(bucket.last_refill_ms);

        // Try to consume
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
