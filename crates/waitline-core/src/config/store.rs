//! Key-value store configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Which store adapter backs the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis-compatible server (required for multi-instance deployments).
    #[default]
    Redis,
    /// In-process store for single-node development and tests.
    Memory,
}

/// Top-level store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    /// Store adapter type.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Redis-specific configuration.
    #[serde(default)]
    #[validate(nested)]
    pub redis: RedisStoreConfig,
}

/// Redis backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RedisStoreConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    #[validate(length(min = 1))]
    pub url: String,
    /// Prefix applied in front of every queue key.
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: String::new(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
