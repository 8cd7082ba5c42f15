//! The queue store interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use waitline_core::AppResult;
use waitline_core::types::{ConcertId, UserId};
use waitline_entity::{EnterOutcome, Lease, QueueStatus};

/// Result of a `Ready -> Active` transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationResult {
    /// The lease moved from `Ready` to `Active` with a fresh expiry.
    Promoted,
    /// The lease was already `Active` and live; nothing changed.
    AlreadyActive,
    /// No lease exists.
    NotFound,
    /// The lease exists but has expired.
    Expired,
}

/// Result of an atomic extension attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionResult {
    /// Extended; carries the new extension count.
    Extended(u32),
    /// No lease exists.
    NotFound,
    /// The extension cap was already reached.
    LimitReached,
    /// The lease is not `Ready` or `Active`.
    NotActive,
    /// The lease has expired.
    Expired,
}

/// What a withdrawal took away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// A lease (and its active-set entry) was deleted.
    pub lease_removed: bool,
    /// A wait entry was withdrawn.
    pub wait_removed: bool,
}

impl RemovalReport {
    /// Whether anything existed for the pair.
    pub fn removed_anything(&self) -> bool {
        self.lease_removed || self.wait_removed
    }
}

/// Queue storage operations.
///
/// Every method that touches more than one structure (wait list, active set,
/// lease hash) is atomic: concurrent callers observe either none or all of
/// its effects. Reads and writes take `now` explicitly so the store never
/// consults a clock of its own.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// Atomic enter: return a live lease if one exists, otherwise drop any
    /// stale lease and add the user to the wait list if absent.
    async fn enter(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<EnterOutcome>;

    /// Add to the wait list if absent and return the 0-based rank.
    async fn add_to_wait(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// 0-based wait rank, `None` when not waiting.
    async fn wait_rank(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<Option<u64>>;

    /// Number of waiting users.
    async fn wait_size(&self, concert_id: &ConcertId) -> AppResult<u64>;

    /// Number of `Ready`/`Active` leases.
    async fn active_size(&self, concert_id: &ConcertId) -> AppResult<u64>;

    /// Remove up to `n` users from the head of the wait list, in arrival order.
    async fn pop_batch(&self, concert_id: &ConcertId, n: u64) -> AppResult<Vec<UserId>>;

    /// Withdraw a wait entry. Returns whether one existed.
    async fn remove_from_wait(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<bool>;

    /// Read a lease. An unreadable record is `QueueDataCorruption`.
    async fn get_lease(&self, concert_id: &ConcertId, user_id: &UserId)
    -> AppResult<Option<Lease>>;

    /// Write a lease and its active-set entry, withdrawing any wait entry.
    async fn create_lease(&self, lease: &Lease, now: DateTime<Utc>) -> AppResult<()>;

    /// Change the status of an existing lease. Returns whether it existed.
    async fn set_status(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        status: QueueStatus,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Change the expiry of an existing lease. Returns whether it existed.
    async fn set_expiry(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Bump the extension count of an existing lease.
    async fn increment_extend_count(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<Option<u32>>;

    /// Delete a lease and its active-set entry. Returns whether anything
    /// was removed.
    async fn remove_lease(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<bool>;

    /// Delete the lease, its active-set entry and any wait entry in one step.
    async fn withdraw(&self, concert_id: &ConcertId, user_id: &UserId)
    -> AppResult<RemovalReport>;

    /// Pop up to `n` waiting users and give each a `Ready` lease expiring at
    /// `expires_at`. All-or-nothing per user. The batch is further capped so
    /// the active set never grows past `capacity`.
    async fn migrate_wait_to_active(
        &self,
        concert_id: &ConcertId,
        n: u64,
        capacity: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<UserId>>;

    /// `Ready -> Active` with a refreshed expiry, idempotent on `Active`.
    async fn activate_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ActivationResult>;

    /// Re-check the cap, status and expiry, then bump the count and move the
    /// expiry in one step.
    async fn extend_lease(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        new_expires_at: DateTime<Utc>,
        max_extensions: u32,
        now: DateTime<Utc>,
    ) -> AppResult<ExtensionResult>;

    /// Remove every lease whose expiry is at or before `now`.
    async fn reclaim_expired(&self, concert_id: &ConcertId, now: DateTime<Utc>) -> AppResult<u64>;

    /// Tenants with at least one wait or active entry.
    async fn active_concerts(&self) -> AppResult<Vec<ConcertId>>;

    /// Check store connectivity.
    async fn health_check(&self) -> AppResult<bool>;
}
