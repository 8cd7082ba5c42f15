//! Injectable wall clock.
//!
//! Every expiry, extension and refill decision reads time through [`Clock`]
//! so tests can drive lease lifetimes deterministically with [`ManualClock`].

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// The current time as Unix milliseconds, the score unit used in the store.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Drop sub-millisecond precision. Stored expiries and scores are whole
/// milliseconds, so every instant that ends up in a lease goes through here.
pub fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(3)
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Shared system clock handle.
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(Utc::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a manual clock pinned at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Create a manual clock pinned at the current system time, truncated
    /// to whole milliseconds (the resolution of stored expiries).
    pub fn starting_now() -> Self {
        Self::new(truncate_to_millis(Utc::now()))
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current += delta;
    }

    /// Pin the clock to an exact instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}
