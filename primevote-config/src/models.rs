use std::path::PathBuf;
use std::time::Duration;

use primevote_core::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TOPIC, GenerationConfig, PoolSettings};
use serde::{Deserialize, Serialize};

/// Everything the `primevote` binary can be configured with. Every section
/// is optional in a file; missing keys fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker count, sampling range and per-worker target for `generate`.
    pub generation: GenerationConfig,
    pub pool: PoolConfig,
    pub queue: QueueConfig,
    /// Name of the notification topic.
    pub topic: String,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            pool: PoolConfig::default(),
            queue: QueueConfig::default(),
            topic: DEFAULT_TOPIC.to_string(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        self.pool.to_settings()
    }
}

/// Worker pool tuning. Durations are plain integers so they read naturally
/// in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Seconds the pool waits before cancelling outstanding workers.
    pub deadline_secs: u64,
    /// Pause between worker iterations in milliseconds.
    pub worker_pause_ms: u64,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
    /// Publish a notification for every prime found.
    pub announce_primes: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let defaults = PoolSettings::default();
        Self {
            deadline_secs: defaults.deadline.as_secs(),
            worker_pause_ms: u64::try_from(defaults.worker_pause.as_millis()).unwrap_or(10),
            seed: defaults.seed,
            announce_primes: defaults.announce_primes,
        }
    }
}

impl PoolConfig {
    pub const MIN_DEADLINE_SECS: u64 = 1;
    pub const MAX_DEADLINE_SECS: u64 = 3_600;
    pub const MAX_WORKER_PAUSE_MS: u64 = 1_000;

    pub fn to_settings(&self) -> PoolSettings {
        PoolSettings {
            deadline: Duration::from_secs(self.deadline_secs),
            worker_pause: Duration::from_millis(self.worker_pause_ms),
            seed: self.seed,
            announce_primes: self.announce_primes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum queued primes; `0` means unbounded.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Where the prime set is persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub csv_path: PathBuf,
    /// Load `csv_path` into the set at startup when it exists.
    pub load_on_startup: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("primes.csv"),
            load_on_startup: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let config: AppConfig = toml::from_str(
            r#"
            topic = "Ballots"

            [generation]
            worker_count = 6

            [pool]
            seed = 9
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.topic, "Ballots");
        assert_eq!(config.generation.worker_count, 6);
        assert_eq!(config.generation.upper_bound, 1_000);
        assert_eq!(config.pool.seed, Some(9));
        assert_eq!(config.pool.deadline_secs, 120);
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.storage.csv_path, PathBuf::from("primes.csv"));
    }

    #[test]
    fn pool_config_converts_to_settings() {
        let pool = PoolConfig {
            deadline_secs: 5,
            worker_pause_ms: 0,
            seed: Some(1),
            announce_primes: false,
        };
        let settings = pool.to_settings();
        assert_eq!(settings.deadline, Duration::from_secs(5));
        assert!(settings.worker_pause.is_zero());
        assert_eq!(settings.seed, Some(1));
        assert!(!settings.announce_primes);
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let rendered = toml::to_string(&AppConfig::default()).expect("serialize");
        let parsed: AppConfig = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed, AppConfig::default());
    }
}
