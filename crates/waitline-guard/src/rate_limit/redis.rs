//! Redis-backed token buckets.

use async_trait::async_trait;
use redis::Script;

use waitline_core::AppResult;
use waitline_store::redis::{RedisClient, client::map_redis_err};

use super::RateLimitBackend;

/// Lua script for one atomic refill-and-consume.
///
/// KEYS[1] = bucket hash
/// ARGV[1] = capacity
/// ARGV[2] = refill rate (tokens per second)
/// ARGV[3] = now (ms)
///
/// Returns:
///   1 = allowed (token consumed)
///   0 = denied
const TOKEN_BUCKET_SCRIPT: &str = r#"
    local capacity = tonumber(ARGV[1])
    local rate = tonumber(ARGV[2])
    local now = tonumber(ARGV[3])

    local bucket = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill')
    local tokens = tonumber(bucket[1])
    local last = tonumber(bucket[2])
    if tokens == nil or last == nil then
        tokens = capacity
        last = now
    end

    local elapsed = math.max(0, now - last) / 1000
    tokens = math.min(capacity, tokens + elapsed * rate)
    if now > last then
        last = now
    end

    local allowed = 0
    if tokens >= 1 then
        tokens = tokens - 1
        allowed = 1
    end

    redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'last_refill', tostring(last))
    -- An idle bucket is full again after capacity / rate seconds
    redis.call('PEXPIRE', KEYS[1], math.ceil(capacity / rate * 1000) + 1000)
    return allowed
"#;

/// Token buckets stored as Redis hashes, shared by every instance.
#[derive(Debug, Clone)]
pub struct RedisTokenBucket {
    /// Redis client.
    client: RedisClient,
    /// Refill-and-consume script.
    script: Script,
}

impl RedisTokenBucket {
    /// Create a new Redis bucket backend.
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimitBackend for RedisTokenBucket {
    async fn try_consume(
        &self,
        key: &str,
        capacity: u32,
        refill_rate: f64,
        now_ms: i64,
    ) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let allowed: i64 = self
            .script
            .key(key)
            .arg(capacity)
            .arg(refill_rate)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(allowed == 1)
    }
}
