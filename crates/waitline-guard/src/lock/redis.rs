//! Redis-backed lease lock for clustered deployments.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use tracing::{debug, error, warn};
use uuid::Uuid;

use waitline_core::types::ConcertId;
use waitline_store::redis::RedisClient;

use super::SchedulerLock;

/// Compare-and-delete release.
///
/// KEYS[1] = lock key
/// ARGV[1] = owner id
///
/// Returns 1 when the caller owned and released the lock, 0 otherwise.
const UNLOCK_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// `SET NX PX` lock carrying this instance's owner id.
///
/// The TTL only matters when a holder dies mid-pass; a healthy holder always
/// releases explicitly.
#[derive(Debug, Clone)]
pub struct RedisLock {
    /// Redis client.
    client: RedisClient,
    /// Owner id of this instance.
    owner: String,
    /// Lock lifetime.
    ttl: Duration,
    /// Release script.
    unlock: Script,
}

impl RedisLock {
    /// Create a lock owned by a fresh instance id.
    pub fn new(client: RedisClient, ttl: Duration) -> Self {
        Self {
            client,
            owner: Uuid::new_v4().to_string(),
            ttl,
            unlock: Script::new(UNLOCK_SCRIPT),
        }
    }
}

#[async_trait]
impl SchedulerLock for RedisLock {
    async fn try_acquire(&self, scheduler: &str, concert_id: &ConcertId) -> bool {
        let key = self.client.keys().scheduler_lock(scheduler, concert_id.as_str());
        let mut conn = self.client.conn_mut();

        // SET key owner PX ttl NX
        let result: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(&key)
            .arg(&self.owner)
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .arg("NX")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!(scheduler, concert_id = %concert_id, "Lock held elsewhere");
                false
            }
            Err(e) => {
                error!(scheduler, concert_id = %concert_id, error = %e, "Lock acquisition failed");
                false
            }
        }
    }

    async fn release(&self, scheduler: &str, concert_id: &ConcertId) {
        let key = self.client.keys().scheduler_lock(scheduler, concert_id.as_str());
        let mut conn = self.client.conn_mut();

        let result: Result<i64, redis::RedisError> = self
            .unlock
            .key(&key)
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(1) => {}
            Ok(_) => warn!(
                scheduler,
                concert_id = %concert_id,
                "Lock expired or taken over before release"
            ),
            Err(e) => error!(
                scheduler,
                concert_id = %concert_id,
                error = %e,
                "Lock release failed"
            ),
        }
    }
}
