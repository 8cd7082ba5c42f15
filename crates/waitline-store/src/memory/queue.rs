//! In-memory queue store using a Tokio mutex for single-node deployments.
//!
//! One mutex guards every tenant, so each operation is as atomic as its
//! Redis script counterpart. Lease records are kept as raw string fields and
//! decoded through the same codec, so damaged data surfaces identically.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use waitline_core::AppResult;
use waitline_core::error::AppError;
use waitline_core::types::{ConcertId, UserId};
use waitline_entity::{EnterOutcome, Lease, QueueStatus, generate_token};

use super::sorted::ScoredSet;
use crate::codec::{self, FIELD_EXPIRES_AT, FIELD_EXTEND_COUNT, FIELD_STATUS, FIELD_TOKEN};
use crate::store::{ActivationResult, ExtensionResult, QueueStore, RemovalReport};

type RawLease = HashMap<String, String>;

/// Queue structures of one tenant.
#[derive(Debug, Default)]
struct TenantState {
    /// Wait list scored by arrival ms.
    wait: ScoredSet,
    /// Admitted users scored by expiry ms.
    active: ScoredSet,
    /// Lease records by user id.
    leases: HashMap<String, RawLease>,
}

impl TenantState {
    fn is_idle(&self) -> bool {
        self.wait.is_empty() && self.active.is_empty() && self.leases.is_empty()
    }

    fn drop_lease(&mut self, user: &str) -> bool {
        let had_lease = self.leases.remove(user).is_some();
        let had_entry = self.active.remove(user);
        had_lease || had_entry
    }
}

fn raw_status(fields: &RawLease) -> Option<&str> {
    fields.get(FIELD_STATUS).map(String::as_str)
}

fn raw_expiry(fields: &RawLease) -> Option<i64> {
    fields.get(FIELD_EXPIRES_AT).and_then(|v| v.parse().ok())
}

fn is_admitted(status: Option<&str>) -> bool {
    matches!(status, Some("READY") | Some("ACTIVE"))
}

fn is_known(status: Option<&str>) -> bool {
    matches!(status, Some("READY") | Some("ACTIVE") | Some("EXPIRED"))
}

fn is_live(fields: &RawLease, now_ms: i64) -> bool {
    is_admitted(raw_status(fields)) && raw_expiry(fields).is_some_and(|exp| exp >= now_ms)
}

fn raw_from(lease: &Lease) -> RawLease {
    codec::encode(lease)
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// In-memory queue store for single-node deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    /// Tenant structures keyed by concert id.
    state: Arc<Mutex<HashMap<String, TenantState>>>,
}

impl MemoryQueueStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        info!("In-memory queue store initialized");
        Self::default()
    }

    /// Overwrite a lease record with raw fields, bypassing all checks.
    /// Used to simulate damaged data.
    pub async fn put_raw_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        fields: HashMap<String, String>,
    ) {
        let mut state = self.state.lock().await;
        state
            .entry(concert_id.to_string())
            .or_default()
            .leases
            .insert(user_id.to_string(), fields);
    }

    /// Whether the user has an active-set entry. Exposes the raw structure
    /// so callers can assert the set and the lease records agree.
    pub async fn in_active_set(&self, concert_id: &ConcertId, user_id: &UserId) -> bool {
        let state = self.state.lock().await;
        state
            .get(concert_id.as_str())
            .is_some_and(|t| t.active.contains(user_id.as_str()))
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enter(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<EnterOutcome> {
        let now_ms = now.timestamp_millis();
        let user = user_id.as_str();
        let mut state = self.state.lock().await;
        let tenant = state.entry(concert_id.to_string()).or_default();

        if let Some(fields) = tenant.leases.get(user) {
            let status = raw_status(fields);
            // Unreadable records are decoded so the caller sees corruption
            if !is_known(status) || raw_expiry(fields).is_none() || is_live(fields, now_ms) {
                let lease = codec::decode(concert_id, user_id, fields)?;
                return Ok(EnterOutcome::Admitted(lease));
            }
            tenant.drop_lease(user);
        }

        let newly_added = tenant.wait.insert_nx(user, now_ms);
        let rank = tenant.wait.rank(user).unwrap_or_default();
        if newly_added {
            debug!(concert_id = %concert_id, user_id = %user_id, rank, "Added to wait list");
        }
        Ok(EnterOutcome::Waiting {
            rank,
            total_waiting: tenant.wait.len(),
            newly_added,
        })
    }

    async fn add_to_wait(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let tenant = state.entry(concert_id.to_string()).or_default();
        tenant.wait.insert_nx(user_id.as_str(), now.timestamp_millis());
        Ok(tenant.wait.rank(user_id.as_str()).unwrap_or_default())
    }

    async fn wait_rank(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<Option<u64>> {
        let state = self.state.lock().await;
        Ok(state
            .get(concert_id.as_str())
            .and_then(|t| t.wait.rank(user_id.as_str())))
    }

    async fn wait_size(&self, concert_id: &ConcertId) -> AppResult<u64> {
        let state = self.state.lock().await;
        Ok(state.get(concert_id.as_str()).map_or(0, |t| t.wait.len()))
    }

    async fn active_size(&self, concert_id: &ConcertId) -> AppResult<u64> {
        let state = self.state.lock().await;
        Ok(state.get(concert_id.as_str()).map_or(0, |t| t.active.len()))
    }

    async fn pop_batch(&self, concert_id: &ConcertId, n: u64) -> AppResult<Vec<UserId>> {
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(Vec::new());
        };
        tenant
            .wait
            .pop_min(n)
            .into_iter()
            .map(|u| {
                UserId::new(u.clone()).map_err(|_| {
                    AppError::data_corruption(format!("Invalid user id '{u}' in queue"))
                })
            })
            .collect()
    }

    async fn remove_from_wait(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .get_mut(concert_id.as_str())
            .is_some_and(|t| t.wait.remove(user_id.as_str())))
    }

    async fn get_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<Option<Lease>> {
        let state = self.state.lock().await;
        let Some(tenant) = state.get(concert_id.as_str()) else {
            return Ok(None);
        };
        let Some(fields) = tenant.leases.get(user_id.as_str()) else {
            return Ok(None);
        };

        let lease = codec::decode(concert_id, user_id, fields)?;
        if lease.is_active() && !tenant.active.contains(user_id.as_str()) {
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

    async fn create_lease(&self, lease: &Lease, _now: DateTime<Utc>) -> AppResult<()> {
        let user = lease.user_id.as_str();
        let mut state = self.state.lock().await;
        let tenant = state.entry(lease.concert_id.to_string()).or_default();

        tenant.leases.insert(user.to_string(), raw_from(lease));
        if lease.is_active() {
            tenant.active.upsert(user, lease.expires_at.timestamp_millis());
        } else {
            tenant.active.remove(user);
        }
        tenant.wait.remove(user);
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
        let user = user_id.as_str();
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(false);
        };
        let Some(fields) = tenant.leases.get_mut(user) else {
            return Ok(false);
        };

        fields.insert(FIELD_STATUS.to_string(), status.as_str().to_string());
        if status.is_admitted() {
            let expiry = raw_expiry(fields).ok_or_else(|| {
                AppError::data_corruption(format!(
                    "Lease for concert '{concert_id}', user '{user_id}' has no readable expiry"
                ))
            })?;
            tenant.active.upsert(user, expiry);
        } else {
            tenant.active.remove(user);
        }
        Ok(true)
    }

    async fn set_expiry(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let user = user_id.as_str();
        let expiry = expires_at.timestamp_millis();
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(false);
        };
        let Some(fields) = tenant.leases.get_mut(user) else {
            return Ok(false);
        };

        fields.insert(FIELD_EXPIRES_AT.to_string(), expiry.to_string());
        if is_admitted(raw_status(fields)) {
            tenant.active.upsert(user, expiry);
        }
        Ok(true)
    }

    async fn increment_extend_count(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<Option<u32>> {
        let mut state = self.state.lock().await;
        let Some(fields) = state
            .get_mut(concert_id.as_str())
            .and_then(|t| t.leases.get_mut(user_id.as_str()))
        else {
            return Ok(None);
        };

        let current: u32 = match fields.get(FIELD_EXTEND_COUNT) {
            Some(raw) => raw.parse().map_err(|_| {
                AppError::data_corruption(format!("Extend count '{raw}' is not a number"))
            })?,
            None => 0,
        };
        let next = current + 1;
        fields.insert(FIELD_EXTEND_COUNT.to_string(), next.to_string());
        Ok(Some(next))
    }

    async fn remove_lease(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(false);
        };
        let removed = tenant.drop_lease(user_id.as_str());
        if tenant.is_idle() {
            state.remove(concert_id.as_str());
        }
        Ok(removed)
    }

    async fn withdraw(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<RemovalReport> {
        let user = user_id.as_str();
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(RemovalReport::default());
        };
        let report = RemovalReport {
            lease_removed: tenant.drop_lease(user),
            wait_removed: tenant.wait.remove(user),
        };
        if tenant.is_idle() {
            state.remove(concert_id.as_str());
        }
        Ok(report)
    }

    async fn migrate_wait_to_active(
        &self,
        concert_id: &ConcertId,
        n: u64,
        capacity: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<UserId>> {
        let now_ms = now.timestamp_millis();
        let expiry = expires_at.timestamp_millis();
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(Vec::new());
        };

        let free = capacity.saturating_sub(tenant.active.len());
        let batch = n.min(free);
        if batch == 0 {
            return Ok(Vec::new());
        }

        let mut moved = Vec::new();
        for user in tenant.wait.pop_min(batch) {
            if tenant.leases.get(&user).is_some_and(|f| is_live(f, now_ms)) {
                continue;
            }
            let user_id = UserId::new(user.clone()).map_err(|_| {
                AppError::data_corruption(format!("Invalid user id '{user}' in queue"))
            })?;
            let lease = Lease::ready(
                concert_id.clone(),
                user_id.clone(),
                generate_token(),
                expires_at,
            );
            tenant.leases.insert(user.clone(), raw_from(&lease));
            tenant.active.upsert(&user, expiry);
            moved.push(user_id);
        }
        Ok(moved)
    }

    async fn activate_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ActivationResult> {
        let now_ms = now.timestamp_millis();
        let user = user_id.as_str();
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(ActivationResult::NotFound);
        };
        let Some(fields) = tenant.leases.get_mut(user) else {
            return Ok(ActivationResult::NotFound);
        };

        let unreadable = || {
            error!(
                concert_id = %concert_id,
                user_id = %user_id,
                "Activation hit an unreadable lease"
            );
            AppError::data_corruption(format!(
                "Lease for concert '{concert_id}', user '{user_id}' is unreadable"
            ))
        };
        let expiry = raw_expiry(fields).ok_or_else(unreadable)?;

        match raw_status(fields) {
            Some("ACTIVE") if expiry >= now_ms => Ok(ActivationResult::AlreadyActive),
            Some("ACTIVE") | Some("EXPIRED") => Ok(ActivationResult::Expired),
            Some("READY") if expiry < now_ms => Ok(ActivationResult::Expired),
            Some("READY") => {
                let new_expiry = new_expires_at.timestamp_millis();
                fields.insert(FIELD_STATUS.to_string(), QueueStatus::Active.as_str().to_string());
                fields.insert(FIELD_EXPIRES_AT.to_string(), new_expiry.to_string());
                tenant.active.upsert(user, new_expiry);
                Ok(ActivationResult::Promoted)
            }
            _ => Err(unreadable()),
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
        let user = user_id.as_str();
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(ExtensionResult::NotFound);
        };
        let Some(fields) = tenant.leases.get_mut(user) else {
            return Ok(ExtensionResult::NotFound);
        };

        let count = fields
            .get(FIELD_EXTEND_COUNT)
            .and_then(|c| c.parse::<u32>().ok());
        let (Some(count), Some(expiry)) = (count, raw_expiry(fields)) else {
            error!(
                concert_id = %concert_id,
                user_id = %user_id,
                "Extension hit an unreadable lease"
            );
            return Err(AppError::data_corruption(format!(
                "Lease for concert '{concert_id}', user '{user_id}' is unreadable"
            )));
        };
        let status = raw_status(fields);
        if !is_known(status) || fields.get(FIELD_TOKEN).is_none() {
            error!(
                concert_id = %concert_id,
                user_id = %user_id,
                "Extension hit an unreadable lease"
            );
            return Err(AppError::data_corruption(format!(
                "Lease for concert '{concert_id}', user '{user_id}' is unreadable"
            )));
        }

        if count >= max_extensions {
            return Ok(ExtensionResult::LimitReached);
        }
        if !is_admitted(status) {
            return Ok(ExtensionResult::NotActive);
        }
        if expiry < now.timestamp_millis() {
            return Ok(ExtensionResult::Expired);
        }

        let next = count + 1;
        let new_expiry = new_expires_at.timestamp_millis();
        fields.insert(FIELD_EXTEND_COUNT.to_string(), next.to_string());
        fields.insert(FIELD_EXPIRES_AT.to_string(), new_expiry.to_string());
        tenant.active.upsert(user, new_expiry);
        Ok(ExtensionResult::Extended(next))
    }

    async fn reclaim_expired(&self, concert_id: &ConcertId, now: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let Some(tenant) = state.get_mut(concert_id.as_str()) else {
            return Ok(0);
        };

        let expired = tenant.active.at_or_below(now.timestamp_millis());
        for user in &expired {
            tenant.drop_lease(user);
        }
        if tenant.is_idle() {
            state.remove(concert_id.as_str());
        }
        Ok(expired.len() as u64)
    }

    async fn active_concerts(&self) -> AppResult<Vec<ConcertId>> {
        let state = self.state.lock().await;
        let mut concerts: Vec<ConcertId> = state
            .iter()
            .filter(|(_, t)| !t.wait.is_empty() || !t.active.is_empty())
            .filter_map(|(c, _)| ConcertId::new(c.clone()).ok())
            .collect();
        concerts.sort();
        Ok(concerts)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
