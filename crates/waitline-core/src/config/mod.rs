//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod logging;
pub mod polling;
pub mod queue;
pub mod scheduler;
pub mod store;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::logging::LoggingConfig;
pub use self::polling::PollingConfig;
pub use self::queue::QueueConfig;
pub use self::scheduler::{LockConfig, LockStrategy, SchedulerConfig};
pub use self::store::{RedisStoreConfig, StoreBackend, StoreConfig};

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Key-value store settings.
    #[serde(default)]
    #[validate(nested)]
    pub store: StoreConfig,
    /// Admission capacity and lease lifetimes.
    #[serde(default)]
    #[validate(nested)]
    pub queue: QueueConfig,
    /// Background pass intervals and lock strategy.
    #[serde(default)]
    #[validate(nested)]
    pub scheduler: SchedulerConfig,
    /// Status polling pacing and rate limiting.
    #[serde(default)]
    #[validate(nested)]
    pub polling: PollingConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `WAITLINE__`, then validates
    /// the result.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("WAITLINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        loaded.validate()?;
        Ok(loaded)
    }
}
