//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::TimeDelta;

use waitline_core::config::AppConfig;
use waitline_core::types::{Clock, ConcertId, ManualClock, SharedClock, UserId};
use waitline_guard::RateLimiter;
use waitline_guard::lock::NoopLock;
use waitline_guard::rate_limit::MemoryTokenBucket;
use waitline_service::AdmissionService;
use waitline_store::QueueKeys;
use waitline_store::memory::MemoryQueueStore;
use waitline_worker::QueueScheduler;

/// Test application context on the in-memory backend
pub struct TestApp {
    /// Admission API
    pub admission: AdmissionService,
    /// Scheduler with a no-op lock
    pub scheduler: QueueScheduler,
    /// Raw store for structural assertions
    pub store: Arc<MemoryQueueStore>,
    /// Manually driven clock
    pub clock: ManualClock,
    /// Application config
    pub config: AppConfig,
}

impl TestApp {
    /// Create a new test application with the given admission capacity
    pub fn new(capacity: u32) -> Self {
        let mut config = AppConfig::default();
        config.queue.active_max_size = capacity;
        Self::with_config(config)
    }

    /// Create a new test application from a full config
    pub fn with_config(config: AppConfig) -> Self {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let store = Arc::new(MemoryQueueStore::new());

        let limiter = RateLimiter::new(
            Arc::new(MemoryTokenBucket::new()),
            QueueKeys::default(),
            &config.polling,
            Arc::clone(&shared),
        );
        let admission =
            AdmissionService::new(store.clone(), limiter, Arc::clone(&shared), &config);
        let scheduler = QueueScheduler::new(store.clone(), Arc::new(NoopLock), shared, &config);

        Self {
            admission,
            scheduler,
            store,
            clock,
            config,
        }
    }

    /// Enter users in order, one millisecond apart
    pub async fn enter_all(&self, concert_id: &ConcertId, users: &[&str]) {
        for id in users {
            self.admission.enter(concert_id, &user(id)).await.unwrap();
            self.clock.advance(TimeDelta::milliseconds(1));
        }
    }

    /// Current lease token for a user, if one was issued
    pub async fn token_of(&self, concert_id: &ConcertId, user_id: &UserId) -> Option<String> {
        self.admission
            .status(concert_id, user_id)
            .await
            .unwrap()
            .token
    }

    /// Current time on the test clock
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

/// Build a concert id
pub fn concert(id: &str) -> ConcertId {
    ConcertId::new(id).unwrap()
}

/// Build a user id
pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}
