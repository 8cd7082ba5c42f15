//! Admission API: enter, status, activate, extend, validate, remove.

use std::sync::Arc;

use tracing::{debug, info, warn};

use waitline_core::AppResult;
use waitline_core::config::{AppConfig, PollingConfig, QueueConfig};
use waitline_core::error::AppError;
use waitline_core::types::{ConcertId, SharedClock, UserId};
use waitline_entity::{EnterOutcome, EnterStatus, Lease, QueuePosition, QueueToken};
use waitline_guard::{RateLimitDecision, RateLimiter};
use waitline_store::{ActivationResult, ExtensionResult, QueueStore, RemovalReport};

use super::poll::{StatusPoll, next_poll_after_ms};
use super::waiting_cache::WaitingCountCache;

/// Caller-facing admission operations for every tenant.
///
/// Downstream services guarding a protected resource must call
/// [`AdmissionService::validate`] with the token the client presented and
/// deny access on any error.
#[derive(Debug, Clone)]
pub struct AdmissionService {
    /// Queue store.
    store: Arc<dyn QueueStore>,
    /// Status-poll limiter.
    limiter: RateLimiter,
    /// Display-only waiting counts.
    waiting: WaitingCountCache,
    /// Time source.
    clock: SharedClock,
    /// Capacity and lease lifetimes.
    queue: QueueConfig,
    /// Poll pacing.
    polling: PollingConfig,
    /// Promotion cadence in seconds, for wait estimates.
    interval_seconds: u64,
}

impl AdmissionService {
    /// Creates a new admission service.
    pub fn new(
        store: Arc<dyn QueueStore>,
        limiter: RateLimiter,
        clock: SharedClock,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            waiting: WaitingCountCache::new(config.queue.total_waiting_cache_ttl()),
            clock,
            queue: config.queue.clone(),
            polling: config.polling.clone(),
            interval_seconds: config.scheduler.activation_interval_seconds(),
        }
    }

    /// Join the queue, or report the existing admission.
    ///
    /// Idempotent: repeated calls keep the original arrival order.
    pub async fn enter(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<QueuePosition> {
        let now = self.clock.now();
        match self.store.enter(concert_id, user_id, now).await? {
            EnterOutcome::Waiting {
                rank,
                total_waiting,
                newly_added,
            } => {
                self.waiting.record(concert_id, total_waiting).await;
                let position = rank + 1;
                let status = if newly_added {
                    info!(
                        concert_id = %concert_id,
                        user_id = %user_id,
                        position,
                        total_waiting,
                        "User entered queue"
                    );
                    EnterStatus::New
                } else {
                    EnterStatus::AlreadyWaiting
                };
                Ok(QueuePosition {
                    status,
                    position: Some(position),
                    total_waiting,
                    estimated_wait_seconds: self.estimate(position),
                    lease: None,
                })
            }
            EnterOutcome::Admitted(lease) => {
                debug!(
                    concert_id = %concert_id,
                    user_id = %user_id,
                    status = %lease.status,
                    "Enter returned existing lease"
                );
                let total_waiting = self.waiting.get_or_load(concert_id, &self.store).await?;
                Ok(QueuePosition {
                    status: EnterStatus::AlreadyAdmitted,
                    position: None,
                    total_waiting,
                    estimated_wait_seconds: 0,
                    lease: Some(QueueToken::from_lease(&lease, now)),
                })
            }
        }
    }

    /// Current view: a lease wins over a wait entry.
    pub async fn status(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<QueueToken> {
        let now = self.clock.now();
        if let Some(lease) = self.store.get_lease(concert_id, user_id).await? {
            return Ok(QueueToken::from_lease(&lease, now));
        }
        match self.store.wait_rank(concert_id, user_id).await? {
            Some(rank) => Ok(QueueToken::waiting(
                concert_id.clone(),
                user_id.clone(),
                rank + 1,
            )),
            None => Ok(QueueToken::not_found(concert_id.clone(), user_id.clone())),
        }
    }

    /// `status`, gated by the per-user token bucket.
    pub async fn poll_status(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<StatusPoll> {
        if let RateLimitDecision::Denied {
            retry_after_seconds,
        } = self.limiter.check(concert_id, user_id).await
        {
            return Ok(StatusPoll::Throttled {
                retry_after_seconds,
            });
        }
        let token = self.status(concert_id, user_id).await?;
        let next_poll_after_ms = next_poll_after_ms(&token, &self.polling);
        Ok(StatusPoll::Status {
            token,
            next_poll_after_ms,
        })
    }

    /// `Ready -> Active`. Calling again on an active lease changes nothing.
    pub async fn activate(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<QueueToken> {
        let now = self.clock.now();
        let expires_at = now + self.queue.active_ttl();

        match self
            .store
            .activate_lease(concert_id, user_id, expires_at, now)
            .await?
        {
            ActivationResult::Promoted => {
                info!(concert_id = %concert_id, user_id = %user_id, "Lease activated");
            }
            ActivationResult::AlreadyActive => {
                debug!(concert_id = %concert_id, user_id = %user_id, "Lease already active");
            }
            ActivationResult::NotFound => {
                return Err(AppError::token_not_found(concert_id.as_str(), user_id.as_str()));
            }
            ActivationResult::Expired => {
                return Err(AppError::token_expired(concert_id.as_str(), user_id.as_str()));
            }
        }

        let lease = self.require_lease(concert_id, user_id).await?;
        Ok(QueueToken::from_lease(&lease, now))
    }

    /// Push the expiry out by one active lifetime, at most `max_extensions`
    /// times per lease.
    pub async fn extend(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<QueueToken> {
        let now = self.clock.now();
        let lease = self.require_lease(concert_id, user_id).await?;

        lease.ensure_can_extend(self.queue.max_extensions)?;
        if lease.is_expired(now) {
            return Err(AppError::token_expired(concert_id.as_str(), user_id.as_str()));
        }

        let new_expires_at = now + self.queue.active_ttl();
        let result = self
            .store
            .extend_lease(
                concert_id,
                user_id,
                new_expires_at,
                self.queue.max_extensions,
                now,
            )
            .await?;

        let count = match result {
            ExtensionResult::Extended(count) => count,
            ExtensionResult::NotFound => {
                return Err(AppError::token_not_found(concert_id.as_str(), user_id.as_str()));
            }
            ExtensionResult::LimitReached => {
                return Err(AppError::extension_limit_exceeded(
                    concert_id.as_str(),
                    user_id.as_str(),
                ));
            }
            ExtensionResult::NotActive => {
                return Err(AppError::token_invalid(concert_id.as_str(), user_id.as_str()));
            }
            ExtensionResult::Expired => {
                return Err(AppError::token_expired(concert_id.as_str(), user_id.as_str()));
            }
        };

        let extended = Lease {
            extend_count: count,
            ..lease.with_extension(new_expires_at)
        };
        info!(
            concert_id = %concert_id,
            user_id = %user_id,
            extend_count = count,
            expires_at = %new_expires_at,
            "Lease extended"
        );
        Ok(QueueToken::from_lease(&extended, now))
    }

    /// Check a presented token. Any error means deny access.
    pub async fn validate(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
        token: &str,
    ) -> AppResult<Lease> {
        let now = self.clock.now();
        let lease = self.require_lease(concert_id, user_id).await?;
        if let Err(e) = lease.ensure_valid_for(token, now) {
            warn!(
                concert_id = %concert_id,
                user_id = %user_id,
                kind = %e.kind,
                "Token validation failed"
            );
            return Err(e);
        }
        Ok(lease)
    }

    /// Evict the lease and withdraw any wait entry.
    pub async fn remove(
        &self,
        concert_id: &ConcertId,
        user_id: &UserId,
    ) -> AppResult<RemovalReport> {
        let report = self.store.withdraw(concert_id, user_id).await?;
        if report.removed_anything() {
            info!(
                concert_id = %concert_id,
                user_id = %user_id,
                lease_removed = report.lease_removed,
                wait_removed = report.wait_removed,
                "Removed from queue"
            );
        }
        Ok(report)
    }

    /// Store connectivity.
    pub async fn health_check(&self) -> AppResult<bool> {
        self.store.health_check().await
    }

    async fn require_lease(&self, concert_id: &ConcertId, user_id: &UserId) -> AppResult<Lease> {
        self.store
            .get_lease(concert_id, user_id)
            .await?
            .ok_or_else(|| AppError::token_not_found(concert_id.as_str(), user_id.as_str()))
    }

    fn estimate(&self, position: u64) -> u64 {
        QueuePosition::estimate_wait_seconds(
            position,
            self.queue.active_max_size,
            self.interval_seconds,
        )
    }
}
