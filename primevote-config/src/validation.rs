use std::fmt;

use primevote_core::GenerationConfig;
use serde::Serialize;

use crate::models::{AppConfig, PoolConfig};

/// A non-fatal problem found while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} (hint: {})", self.message, hint),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigWarnings {
    items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(&mut self, message: impl Into<String>, hint: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }

    /// Emits every warning through `tracing`.
    pub fn log(&self) {
        for warning in &self.items {
            tracing::warn!(target: "primevote::config", hint = ?warning.hint, "{}", warning.message);
        }
    }
}

/// Clamps out-of-range values into their accepted ranges and reports each
/// adjustment.
pub fn apply_guard_rails(config: &mut AppConfig) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();

    let requested = config.generation;
    let clamped = requested.clamped();
    if clamped.worker_count != requested.worker_count {
        let (min, max) = GenerationConfig::WORKER_RANGE;
        warnings.push_with_hint(
            format!(
                "generation.worker_count {} clamped to {}",
                requested.worker_count, clamped.worker_count
            ),
            format!("use a value between {min} and {max}"),
        );
    }
    if clamped.upper_bound != requested.upper_bound {
        let (min, max) = GenerationConfig::UPPER_BOUND_RANGE;
        warnings.push_with_hint(
            format!(
                "generation.upper_bound {} clamped to {}",
                requested.upper_bound, clamped.upper_bound
            ),
            format!("use a value between {min} and {max}"),
        );
    }
    if clamped.target_per_worker != requested.target_per_worker {
        let (min, max) = GenerationConfig::TARGET_RANGE;
        warnings.push_with_hint(
            format!(
                "generation.target_per_worker {} clamped to {}",
                requested.target_per_worker, clamped.target_per_worker
            ),
            format!("use a value between {min} and {max}"),
        );
    }
    config.generation = clamped;

    let deadline = config
        .pool
        .deadline_secs
        .clamp(PoolConfig::MIN_DEADLINE_SECS, PoolConfig::MAX_DEADLINE_SECS);
    if deadline != config.pool.deadline_secs {
        warnings.push(format!(
            "pool.deadline_secs {} clamped to {}",
            config.pool.deadline_secs, deadline
        ));
        config.pool.deadline_secs = deadline;
    }
    if config.pool.worker_pause_ms > PoolConfig::MAX_WORKER_PAUSE_MS {
        warnings.push(format!(
            "pool.worker_pause_ms {} clamped to {}",
            config.pool.worker_pause_ms,
            PoolConfig::MAX_WORKER_PAUSE_MS
        ));
        config.pool.worker_pause_ms = PoolConfig::MAX_WORKER_PAUSE_MS;
    }

    if config.topic.trim().is_empty() {
        warnings.push("topic is empty; using the default topic");
        config.topic = primevote_core::DEFAULT_TOPIC.to_string();
    }
    if config.queue.capacity == 0 {
        warnings.push_with_hint(
            "queue.capacity is 0; the queue is unbounded",
            "set a positive capacity to make producers wait",
        );
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_no_warnings() {
        let mut config = AppConfig::default();
        assert!(apply_guard_rails(&mut config).is_empty());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn out_of_range_generation_is_clamped_with_hints() {
        let mut config = AppConfig::default();
        config.generation = GenerationConfig::new(25, 50, 500);

        let warnings = apply_guard_rails(&mut config);
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.generation, GenerationConfig::new(10, 100, 100));
        assert!(warnings.iter().all(|w| w.hint.is_some()));
        let first = warnings.iter().next().expect("warning").to_string();
        assert_eq!(
            first,
            "generation.worker_count 25 clamped to 10 (hint: use a value between 1 and 10)"
        );
    }

    #[test]
    fn pool_topic_and_queue_are_checked() {
        let mut config = AppConfig::default();
        config.pool.deadline_secs = 0;
        config.pool.worker_pause_ms = 60_000;
        config.topic = "   ".into();
        config.queue.capacity = 0;

        let warnings = apply_guard_rails(&mut config);
        assert_eq!(warnings.len(), 4);
        assert_eq!(config.pool.deadline_secs, 1);
        assert_eq!(config.pool.worker_pause_ms, 1_000);
        assert_eq!(config.topic, primevote_core::DEFAULT_TOPIC);
        assert_eq!(config.queue.capacity, 0);
    }
}
