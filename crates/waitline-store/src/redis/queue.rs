//! Redis-backed queue store.
//!
//! Suitable for multi-instance deployments: every multi-key transition runs
//! as one Lua script, so concurrent instances never observe partial moves.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use waitline_core::AppResult;
use waitline_core::error::AppError;
use waitline_core::types::{ConcertId, UserId};
use waitline_entity::{EnterOutcome, Lease, QueueStatus, generate_token};

use super::client::{RedisClient, map_redis_err};
use crate::codec;
use crate::scripts;
use crate::store::{ActivationResult, ExtensionResult, QueueStore, RemovalReport};

/// Upper bound on leases reclaimed by one script call.
const RECLAIM_BATCH: u64 = 500;

/// Keys requested per SCAN round trip.
const SCAN_COUNT: u64 = 200;

/// Compiled scripts, hashed once per store.
#[derive(Debug, Clone)]
struct Scripts {
    enter: Script,
    add_to_wait: Script,
    migrate: Script,
    activate: Script,
    extend: Script,
    create_lease: Script,
    set_status: Script,
    set_expiry: Script,
    incr_extend: Script,
    remove_lease: Script,
    withdraw: Script,
    reclaim: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            enter: Script::new(scripts::ENTER_SCRIPT),
            add_to_wait: Script::new(scripts::ADD_TO_WAIT_SCRIPT),
            migrate: Script::new(scripts::MIGRATE_SCRIPT),
            activate: Script::new(scripts::ACTIVATE_SCRIPT),
            extend: Script::new(scripts::EXTEND_SCRIPT),
            create_lease: Script::new(scripts::CREATE_LEASE_SCRIPT),
            set_status: Script::new(scripts::SET_STATUS_SCRIPT),
            set_expiry: Script::new(scripts::SET_EXPIRY_SCRIPT),
            incr_extend: Script::new(scripts::INCR_EXTEND_SCRIPT),
            remove_lease: Script::new(scripts::REMOVE_LEASE_SCRIPT),
            withdraw: Script::new(scripts::WITHDRAW_SCRIPT),
            reclaim: Script::new(scripts::RECLAIM_SCRIPT),
        }
    }
}

/// JSON reply of the enter script.
#[derive(Debug, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
enum EnterReply {
    New { rank: u64, total: u64 },
    AlreadyWaiting { rank: u64, total: u64 },
    AlreadyAdmitted { lease: HashMap<String, String> },
}

/// Redis-backed queue store for multi-instance deployments.
#[derive(Debug, Clone)]
pub struct RedisQueueStore {
    /// Redis client.
    client: RedisClient,
    /// Store-level lifetime of a lease record beyond its expiry.
    key_grace: Duration,
    /// Compiled scripts.
    scripts: Scripts,
}

impl RedisQueueStore {
    /// Create a new Redis queue store.
    pub fn new(client: RedisClient, key_grace: Duration) -> Self {
        info!(
            prefix = %client.keys().prefix(),
            key_grace_secs = key_grace.as_secs(),
            "Redis queue store initialized"
        );
        Self {
            client,
            key_grace,
            scripts: Scripts::load(),
        }
    }

    /// Milliseconds the lease key should live: until expiry plus grace.
    fn key_ttl_ms(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let remaining = (expires_at - now).num_milliseconds().max(0);
        (remaining + self.key_grace.as_millis() as i64).max(1)
    }

    fn parse_users(concert_id: &ConcertId, raw: &str) -> AppResult<Vec<UserId>> {
        let users: Vec<String> = serde_json::from_str(raw).map_err(|e| {
            error!(concert_id = %concert_id, raw = %raw, "Corrupted migration result");
            AppError::data_corruption(format!("Undecodable migration result: {e}"))
        })?;
        Self::to_user_ids(concert_id, users)
    }

    fn to_user_ids(concert_id: &ConcertId, members: Vec<String>) -> AppResult<Vec<UserId>> {
        members
            .into_iter()
            .map(|u| {
                UserId::new(u.clone()).map_err(|_| {
                    error!(concert_id = %concert_id, member = %u, "Invalid user id in queue");
                    AppError::data_corruption(format!("Invalid user id '{u}' in queue"))
                })
            })
            .collect()
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn enter(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<EnterOutcome> {
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();

        let raw: String = self
            .scripts
            .enter
            .key(keys.wait(concert_id.as_str()))
            .key(keys.active(concert_id.as_str()))
            .key(keys.lease(concert_id.as_str(), user_id.as_str()))
            .arg(user_id.as_str())
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        let reply: EnterReply = serde_json::from_str(&raw).map_err(|e| {
            error!(
                concert_id = %concert_id,
                user_id = %user_id,
                raw = %raw,
                "Corrupted enter result"
            );
            AppError::data_corruption(format!("Undecodable enter result: {e}"))
        })?;

        match reply {
            EnterReply::New { rank, total } => {
                debug!(concert_id = %concert_id, user_id = %user_id, rank, "Added to wait list");
                Ok(EnterOutcome::Waiting {
                    rank,
                    total_waiting: total,
                    newly_added: true,
                })
            }
            EnterReply::AlreadyWaiting { rank, total } => Ok(EnterOutcome::Waiting {
                rank,
                total_waiting: total,
                newly_added: false,
            }),
            EnterReply::AlreadyAdmitted { lease } => {
                let lease = codec::decode(concert_id, user_id, &lease)?;
                Ok(EnterOutcome::Admitted(lease))
            }
        }
    }

    async fn add_to_wait(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut conn = self.client.conn_mut();
        let rank: u64 = self
            .scripts
            .add_to_wait
            .key(self.client.keys().wait(concert_id.as_str()))
            .arg(user_id.as_str())
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(rank)
    }

    async fn wait_rank(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<Option<u64>> {
        let key = self.client.keys().wait(concert_id.as_str());
        let mut conn = self.client.conn_mut();
        let rank: Option<u64> = conn
            .zrank(&key, user_id.as_str())
            .await
            .map_err(map_redis_err)?;
        Ok(rank)
    }

    async fn wait_size(&self, concert_id: &ConcertId) -> AppResult<u64> {
        let key = self.client.keys().wait(concert_id.as_str());
        let mut conn = self.client.conn_mut();
        let size: u64 = conn.zcard(&key).await.map_err(map_redis_err)?;
        Ok(size)
    }

    async fn active_size(&self, concert_id: &ConcertId) -> AppResult<u64> {
        let key = self.client.keys().active(concert_id.as_str());
        let mut conn = self.client.conn_mut();
        let size: u64 = conn.zcard(&key).await.map_err(map_redis_err)?;
        Ok(size)
    }

    async fn pop_batch(&self, concert_id: &ConcertId, n: u64) -> AppResult<Vec<UserId>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let key = self.client.keys().wait(concert_id.as_str());
        let mut conn = self.client.conn_mut();

        // ZPOPMIN replies with member, score, member, score, ...
        let flat: Vec<String> = redis::cmd("ZPOPMIN")
            .arg(&key)
            .arg(n)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        let members: Vec<String> = flat.into_iter().step_by(2).collect();
        Self::to_user_ids(concert_id, members)
    }

    async fn remove_from_wait(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<bool> {
        let key = self.client.keys().wait(concert_id.as_str());
        let mut conn = self.client.conn_mut();
        let removed: i64 = conn
            .zrem(&key, user_id.as_str())
            .await
            .map_err(map_redis_err)?;
        Ok(removed > 0)
    }

    async fn get_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<Option<Lease>> {
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();

        let (fields, score): (HashMap<String, String>, Option<f64>) = redis::pipe()
            .atomic()
            .hgetall(keys.lease(concert_id.as_str(), user_id.as_str()))
            .zscore(keys.active(concert_id.as_str()), user_id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        if fields.is_empty() {
            return Ok(None);
        }

        let lease = codec::decode(concert_id, user_id, &fields)?;
        if lease.is_active() && score.is_none() {
            error!(
                concert_id = %concert_id,
                user_id = %user_id,
                status = %lease.status,
                "Admitted lease has no active-set entry"
            );
            return Err(AppError::data_corruption(format!(
                "Lease for concert '{concert_id}', user '{user_id}' is missing from the active set"
            )));
        }
        Ok(Some(lease))
    }

    async fn create_lease(&self, lease: &Lease, now: DateTime<Utc>) -> AppResult<()> {
        let keys = self.client.keys();
        let concert = lease.concert_id.as_str();
        let mut conn = self.client.conn_mut();

        let _: i64 = self
            .scripts
            .create_lease
            .key(keys.lease(concert, lease.user_id.as_str()))
            .key(keys.active(concert))
            .key(keys.wait(concert))
            .arg(lease.user_id.as_str())
            .arg(&lease.token)
            .arg(lease.status.as_str())
            .arg(lease.expires_at.timestamp_millis())
            .arg(lease.extend_count)
            .arg(self.key_ttl_ms(lease.expires_at, now))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn set_status(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        status: QueueStatus,
        _now: DateTime<Utc>,
    ) -> AppResult<bool> {
        if !status.is_storable() {
            return Err(AppError::validation(format!(
                "Status {status} cannot be stored on a lease"
            )));
        }
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();
        let existed: i64 = self
            .scripts
            .set_status
            .key(keys.lease(concert_id.as_str(), user_id.as_str()))
            .key(keys.active(concert_id.as_str()))
            .arg(user_id.as_str())
            .arg(status.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(existed == 1)
    }

    async fn set_expiry(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();
        let existed: i64 = self
            .scripts
            .set_expiry
            .key(keys.lease(concert_id.as_str(), user_id.as_str()))
            .key(keys.active(concert_id.as_str()))
            .arg(user_id.as_str())
            .arg(expires_at.timestamp_millis())
            .arg(self.key_ttl_ms(expires_at, now))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(existed == 1)
    }

    async fn increment_extend_count(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<Option<u32>> {
        let mut conn = self.client.conn_mut();
        let count: i64 = self
            .scripts
            .incr_extend
            .key(self.client.keys().lease(concert_id.as_str(), user_id.as_str()))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        if count < 0 {
            return Ok(None);
        }
        u32::try_from(count)
            .map(Some)
            .map_err(|_| AppError::data_corruption(format!("Extend count {count} out of range")))
    }

    async fn remove_lease(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<bool> {
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();
        let removed: i64 = self
            .scripts
            .remove_lease
            .key(keys.lease(concert_id.as_str(), user_id.as_str()))
            .key(keys.active(concert_id.as_str()))
            .arg(user_id.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(removed > 0)
    }

    async fn withdraw(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<RemovalReport> {
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();
        let (lease_removed, wait_removed): (i64, i64) = self
            .scripts
            .withdraw
            .key(keys.lease(concert_id.as_str(), user_id.as_str()))
            .key(keys.active(concert_id.as_str()))
            .key(keys.wait(concert_id.as_str()))
            .arg(user_id.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(RemovalReport {
            lease_removed: lease_removed > 0,
            wait_removed: wait_removed > 0,
        })
    }

    async fn migrate_wait_to_active(
        &self,
        concert_id: &ConcertId,
        n: u64,
        capacity: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<UserId>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let keys = self.client.keys();
        let concert = concert_id.as_str();
        let mut conn = self.client.conn_mut();

        let mut invocation = self.scripts.migrate.prepare_invoke();
        invocation
            .key(keys.wait(concert))
            .key(keys.active(concert))
            .arg(keys.lease_prefix(concert))
            .arg(n)
            .arg(capacity)
            .arg(expires_at.timestamp_millis())
            .arg(now.timestamp_millis())
            .arg(self.key_ttl_ms(expires_at, now));
        for _ in 0..n {
            invocation.arg(generate_token());
        }

        let raw: String = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        Self::parse_users(concert_id, &raw)
    }

    async fn activate_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ActivationResult> {
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();

        let result: i64 = self
            .scripts
            .activate
            .key(keys.lease(concert_id.as_str(), user_id.as_str()))
            .key(keys.active(concert_id.as_str()))
            .arg(user_id.as_str())
            .arg(now.timestamp_millis())
            .arg(new_expires_at.timestamp_millis())
            .arg(self.key_ttl_ms(new_expires_at, now))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        match result {
            1 => Ok(ActivationResult::Promoted),
            -1 => Ok(ActivationResult::AlreadyActive),
            0 => Ok(ActivationResult::NotFound),
            -2 => Ok(ActivationResult::Expired),
            other => {
                error!(
                    concert_id = %concert_id,
                    user_id = %user_id,
                    code = other,
                    "Activation hit an unreadable lease"
                );
                Err(AppError::data_corruption(format!(
                    "Lease for concert '{concert_id}', user '{user_id}' is unreadable"
                )))
            }
        }
    }

    async fn extend_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        new_expires_at: DateTime<Utc>,
        max_extensions: u32,
        now: DateTime<Utc>,
    ) -> AppResult<ExtensionResult> {
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();

        let result: i64 = self
            .scripts
            .extend
            .key(keys.lease(concert_id.as_str(), user_id.as_str()))
            .key(keys.active(concert_id.as_str()))
            .arg(user_id.as_str())
            .arg(now.timestamp_millis())
            .arg(new_expires_at.timestamp_millis())
            .arg(max_extensions)
            .arg(self.key_ttl_ms(new_expires_at, now))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        match result {
            -1 => Ok(ExtensionResult::NotFound),
            -2 => Ok(ExtensionResult::LimitReached),
            -3 => Ok(ExtensionResult::NotActive),
            -4 => Ok(ExtensionResult::Expired),
            count if count > 0 => u32::try_from(count)
                .map(ExtensionResult::Extended)
                .map_err(|_| {
                    AppError::data_corruption(format!("Extend count {count} out of range"))
                }),
            other => {
                error!(
                    concert_id = %concert_id,
                    user_id = %user_id,
                    code = other,
                    "Extension hit an unreadable lease"
                );
                Err(AppError::data_corruption(format!(
                    "Lease for concert '{concert_id}', user '{user_id}' is unreadable"
                )))
            }
        }
    }

    async fn reclaim_expired(&self, concert_id: &ConcertId, now: DateTime<Utc>) -> AppResult<u64> {
        let keys = self.client.keys();
        let concert = concert_id.as_str();
        let mut conn = self.client.conn_mut();
        let mut total = 0u64;

        loop {
            let removed: u64 = self
                .scripts
                .reclaim
                .key(keys.active(concert))
                .arg(keys.lease_prefix(concert))
                .arg(now.timestamp_millis())
                .arg(RECLAIM_BATCH)
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis_err)?;
            total += removed;
            if removed < RECLAIM_BATCH {
                break;
            }
        }

        Ok(total)
    }

    async fn active_concerts(&self) -> AppResult<Vec<ConcertId>> {
        let keys = self.client.keys();
        let mut conn = self.client.conn_mut();
        let mut concerts = BTreeSet::new();

        for pattern in keys.tenant_patterns() {
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_err)?;

                for key in batch {
                    match keys.concert_from_key(&key).map(ConcertId::new) {
                        Some(Ok(concert)) => {
                            concerts.insert(concert);
                        }
                        _ => warn!(key = %key, "Skipping key with unusable concert id"),
                    }
                }

                if next == 0 {
                    break;
                }
                cursor = next;
            }
        }

        Ok(concerts.into_iter().collect())
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(pong == "PONG")
    }
}
