//! Configuration for `primevote`.
//!
//! [`ConfigLoader`] resolves an [`AppConfig`] from an explicit file, the
//! `PRIMEVOTE_CONFIG_PATH` / `PRIMEVOTE_CONFIG_JSON` environment variables,
//! default candidate files, or built-in defaults. Out-of-range values are
//! clamped and reported as [`ConfigWarnings`] rather than rejected.

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{
    CONFIG_JSON_ENV, CONFIG_PATH_ENV, ConfigLoad, ConfigLoadError, ConfigLoader, ConfigSource,
    EnvOverrides,
};
pub use models::{AppConfig, PoolConfig, QueueConfig, StorageConfig};
pub use validation::{ConfigWarning, ConfigWarnings};
