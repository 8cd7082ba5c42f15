//! Admission capacity and lease lifetime configuration.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Admission queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueueConfig {
    /// Maximum number of READY/ACTIVE leases per concert.
    #[serde(default = "default_active_max_size")]
    #[validate(range(min = 1))]
    pub active_max_size: u32,
    /// Lifetime of a freshly promoted READY lease.
    #[serde(default = "default_ready_ttl")]
    #[validate(range(min = 1))]
    pub ready_ttl_seconds: u64,
    /// Lifetime of an ACTIVE lease, applied on activation and each extension.
    #[serde(default = "default_active_ttl")]
    #[validate(range(min = 1))]
    pub active_ttl_seconds: u64,
    /// How many times an ACTIVE lease may be extended.
    #[serde(default = "default_max_extensions")]
    pub max_extensions: u32,
    /// Extra store-level lifetime of a lease record past its expiry.
    #[serde(default = "default_lease_key_grace")]
    pub lease_key_grace_seconds: u64,
    /// Lifetime of the display-only waiting-count cache.
    #[serde(default = "default_total_waiting_cache_ttl")]
    pub total_waiting_cache_ttl_ms: u64,
}

impl QueueConfig {
    /// READY lease lifetime.
    pub fn ready_ttl(&self) -> TimeDelta {
        TimeDelta::seconds(self.ready_ttl_seconds as i64)
    }

    /// ACTIVE lease lifetime.
    pub fn active_ttl(&self) -> TimeDelta {
        TimeDelta::seconds(self.active_ttl_seconds as i64)
    }

    /// Waiting-count cache lifetime.
    pub fn total_waiting_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.total_waiting_cache_ttl_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            active_max_size: default_active_max_size(),
            ready_ttl_seconds: default_ready_ttl(),
            active_ttl_seconds: default_active_ttl(),
            max_extensions: default_max_extensions(),
            lease_key_grace_seconds: default_lease_key_grace(),
            total_waiting_cache_ttl_ms: default_total_waiting_cache_ttl(),
        }
    }
}

fn default_active_max_size() -> u32 {
    50
}

fn default_ready_ttl() -> u64 {
    300
}

fn default_active_ttl() -> u64 {
    600
}

fn default_max_extensions() -> u32 {
    2
}

fn default_lease_key_grace() -> u64 {
    60
}

fn default_total_waiting_cache_ttl() -> u64 {
    1000
}
