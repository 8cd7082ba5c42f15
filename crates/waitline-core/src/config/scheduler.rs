//! Background scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Cross-instance coordination strategy for scheduler passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// No coordination. Only valid when a single scheduler process runs.
    #[default]
    None,
    /// Store-backed per-tenant lease lock.
    Cluster,
}

/// Scheduler lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LockConfig {
    /// Lock strategy.
    #[serde(default)]
    pub strategy: LockStrategy,
    /// Lock TTL, the release safety net if a holder crashes.
    #[serde(default = "default_lock_ttl")]
    #[validate(range(min = 1))]
    pub ttl_seconds: u64,
}

impl LockConfig {
    /// Lock TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            strategy: LockStrategy::default(),
            ttl_seconds: default_lock_ttl(),
        }
    }
}

/// Periodic pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SchedulerConfig {
    /// Whether this process runs the background passes at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Delay between promotion passes in milliseconds.
    #[serde(default = "default_activation_interval")]
    #[validate(range(min = 1))]
    pub activation_interval_ms: u64,
    /// Delay between cleanup passes in milliseconds.
    #[serde(default = "default_cleanup_interval")]
    #[validate(range(min = 1))]
    pub cleanup_interval_ms: u64,
    /// Per-tenant lock settings.
    #[serde(default)]
    #[validate(nested)]
    pub lock: LockConfig,
}

impl SchedulerConfig {
    /// Promotion pass delay.
    pub fn activation_interval(&self) -> Duration {
        Duration::from_millis(self.activation_interval_ms)
    }

    /// Cleanup pass delay.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// Promotion delay in whole seconds, at least one. Used for wait estimates.
    pub fn activation_interval_seconds(&self) -> u64 {
        self.activation_interval_ms.div_ceil(1000).max(1)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_interval_ms: default_activation_interval(),
            cleanup_interval_ms: default_cleanup_interval(),
            lock: LockConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_activation_interval() -> u64 {
    5000
}

fn default_cleanup_interval() -> u64 {
    60000
}

fn default_lock_ttl() -> u64 {
    30
}
