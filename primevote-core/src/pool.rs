//! Worker pool that fans prime generation out over blocking threads and
//! waits for all of them under one deadline.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::PrimeContext;
use crate::error::{PrimeError, Result};
use crate::worker::{GenerationWorker, WorkerOutcome, WorkerReport, WorkerSettings};

/// What one generation run should produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub worker_count: usize,
    pub upper_bound: i64,
    pub target_per_worker: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            upper_bound: 1_000,
            target_per_worker: 10,
        }
    }
}

impl GenerationConfig {
    pub const WORKER_RANGE: (usize, usize) = (1, 10);
    pub const UPPER_BOUND_RANGE: (i64, i64) = (100, 10_000);
    pub const TARGET_RANGE: (usize, usize) = (1, 100);

    pub fn new(worker_count: usize, upper_bound: i64, target_per_worker: usize) -> Self {
        Self {
            worker_count,
            upper_bound,
            target_per_worker,
        }
    }

    /// Rejects values outside the accepted ranges.
    pub fn validate(&self) -> Result<()> {
        let (min_workers, max_workers) = Self::WORKER_RANGE;
        if !(min_workers..=max_workers).contains(&self.worker_count) {
            return Err(PrimeError::InvalidConfig(format!(
                "worker_count must be between {min_workers} and {max_workers}, got {}",
                self.worker_count
            )));
        }
        let (min_bound, max_bound) = Self::UPPER_BOUND_RANGE;
        if !(min_bound..=max_bound).contains(&self.upper_bound) {
            return Err(PrimeError::InvalidConfig(format!(
                "upper_bound must be between {min_bound} and {max_bound}, got {}",
                self.upper_bound
            )));
        }
        let (min_target, max_target) = Self::TARGET_RANGE;
        if !(min_target..=max_target).contains(&self.target_per_worker) {
            return Err(PrimeError::InvalidConfig(format!(
                "target_per_worker must be between {min_target} and {max_target}, got {}",
                self.target_per_worker
            )));
        }
        Ok(())
    }

    /// Pulls every field into its accepted range.
    pub fn clamped(self) -> Self {
        Self {
            worker_count: self
                .worker_count
                .clamp(Self::WORKER_RANGE.0, Self::WORKER_RANGE.1),
            upper_bound: self
                .upper_bound
                .clamp(Self::UPPER_BOUND_RANGE.0, Self::UPPER_BOUND_RANGE.1),
            target_per_worker: self
                .target_per_worker
                .clamp(Self::TARGET_RANGE.0, Self::TARGET_RANGE.1),
        }
    }

    /// Upper bound on distinct primes a run can add.
    pub fn max_primes(&self) -> usize {
        self.worker_count.saturating_mul(self.target_per_worker)
    }
}

/// Runtime knobs for a [`WorkerPool`] that do not change what is generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    /// How long the pool waits for workers before cancelling them.
    pub deadline: Duration,
    pub worker_pause: Duration,
    pub seed: Option<u64>,
    pub announce_primes: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(120),
            worker_pause: Duration::from_millis(10),
            seed: None,
            announce_primes: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    TimedOut,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Completed => "completed",
            RunStatus::TimedOut => "timed out",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Primes added by this run's workers.
    pub primes_found: usize,
    /// Size of the shared set once the run ended.
    pub set_size: usize,
    pub elapsed_ms: u64,
    pub status: RunStatus,
    /// Reports of workers that returned normally, ordered by worker id.
    pub workers: Vec<WorkerReport>,
    /// Workers whose thread panicked.
    pub failed_workers: usize,
}

impl RunSummary {
    pub fn completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Runs a fixed number of [`GenerationWorker`]s against a shared context.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    ctx: PrimeContext,
    settings: PoolSettings,
}

impl WorkerPool {
    pub fn new(ctx: PrimeContext, settings: PoolSettings) -> Self {
        Self { ctx, settings }
    }

    pub fn context(&self) -> &PrimeContext {
        &self.ctx
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub async fn run(&self, config: GenerationConfig) -> Result<RunSummary> {
        self.run_with_shutdown(config, &CancellationToken::new())
            .await
    }

    /// Like [`WorkerPool::run`], but cancelling `shutdown` stops the workers
    /// early and yields a [`RunStatus::Cancelled`] summary.
    pub async fn run_with_shutdown(
        &self,
        config: GenerationConfig,
        shutdown: &CancellationToken,
    ) -> Result<RunSummary> {
        config.validate()?;
        let started = Instant::now();
        let token = shutdown.child_token();
        let deadline_ms = u64::try_from(self.settings.deadline.as_millis()).unwrap_or(u64::MAX);

        info!(
            target: "primevote::pool",
            workers = config.worker_count,
            upper_bound = config.upper_bound,
            per_worker = config.target_per_worker,
            max_primes = config.max_primes(),
            deadline_ms,
            "generation run starting"
        );
        self.ctx.bus().publish_text(format!(
            "generation started: {} workers, upper bound {}, {} primes each",
            config.worker_count, config.upper_bound, config.target_per_worker
        ));

        let mut handles: Vec<JoinHandle<WorkerReport>> = (0..config.worker_count)
            .map(|id| {
                let worker = GenerationWorker::new(
                    id,
                    self.ctx.clone(),
                    self.worker_settings(&config),
                    token.clone(),
                );
                tokio::task::spawn_blocking(move || worker.run())
            })
            .collect();

        let mut joined: Vec<Option<std::result::Result<WorkerReport, tokio::task::JoinError>>> =
            (0..handles.len()).map(|_| None).collect();
        let waited = time::timeout(self.settings.deadline, async {
            for (slot, handle) in joined.iter_mut().zip(handles.iter_mut()) {
                *slot = Some(handle.await);
            }
        })
        .await;

        let timed_out = waited.is_err();
        if timed_out {
            warn!(
                target: "primevote::pool",
                deadline_ms,
                "deadline elapsed, cancelling workers"
            );
            token.cancel();
            for (slot, handle) in joined.iter_mut().zip(handles.iter_mut()) {
                if slot.is_none() {
                    *slot = Some(handle.await);
                }
            }
        }

        let mut workers = Vec::with_capacity(joined.len());
        let mut failed_workers = 0;
        for (id, result) in joined.into_iter().enumerate() {
            match result {
                Some(Ok(report)) => workers.push(report),
                Some(Err(err)) => {
                    failed_workers += 1;
                    warn!(target: "primevote::pool", worker = id, error = %err, "worker task failed");
                }
                None => {
                    return Err(PrimeError::Internal(format!(
                        "worker {id} was never joined"
                    )));
                }
            }
        }

        let any_cancelled = workers
            .iter()
            .any(|report| report.outcome == WorkerOutcome::Cancelled);
        let status = if timed_out {
            RunStatus::TimedOut
        } else if shutdown.is_cancelled() || any_cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        let elapsed = started.elapsed();
        self.ctx.stats().record_run(elapsed);
        let primes_found: usize = workers.iter().map(|report| report.found).sum();
        let summary = RunSummary {
            primes_found,
            set_size: self.ctx.primes().count(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            status,
            workers,
            failed_workers,
        };

        self.ctx.bus().publish_text(format!(
            "generation {}: {} primes in {} ms",
            summary.status, summary.primes_found, summary.elapsed_ms
        ));
        info!(
            target: "primevote::pool",
            %status,
            primes_found = summary.primes_found,
            set_size = summary.set_size,
            elapsed_ms = summary.elapsed_ms,
            failed_workers,
            "generation run finished"
        );

        Ok(summary)
    }

    fn worker_settings(&self, config: &GenerationConfig) -> WorkerSettings {
        WorkerSettings {
            upper_bound: config.upper_bound,
            target: config.target_per_worker,
            pause: self.settings.worker_pause,
            seed: self.settings.seed,
            announce_primes: self.settings.announce_primes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_settings() -> PoolSettings {
        PoolSettings {
            deadline: Duration::from_secs(30),
            worker_pause: Duration::ZERO,
            seed: Some(42),
            announce_primes: true,
        }
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        assert!(GenerationConfig::default().validate().is_ok());
        for bad in [
            GenerationConfig::new(0, 1_000, 10),
            GenerationConfig::new(11, 1_000, 10),
            GenerationConfig::new(4, 99, 10),
            GenerationConfig::new(4, 10_001, 10),
            GenerationConfig::new(4, 1_000, 0),
            GenerationConfig::new(4, 1_000, 101),
        ] {
            assert!(matches!(bad.validate(), Err(PrimeError::InvalidConfig(_))), "{bad:?}");
        }
    }

    #[test]
    fn clamped_pulls_values_into_range() {
        let config = GenerationConfig::new(50, 5, 0).clamped();
        assert_eq!(config, GenerationConfig::new(10, 100, 1));
        assert!(config.validate().is_ok());
        assert_eq!(GenerationConfig::new(3, 500, 7).clamped(), GenerationConfig::new(3, 500, 7));
    }

    #[test]
    fn max_primes_is_workers_times_target() {
        assert_eq!(GenerationConfig::new(4, 1_000, 10).max_primes(), 40);
        assert_eq!(GenerationConfig::new(1, 100, 1).max_primes(), 1);
        assert_eq!(GenerationConfig::new(usize::MAX, 100, 2).max_primes(), usize::MAX);
    }

    #[tokio::test]
    async fn oversized_deadline_does_not_break_the_run() {
        let ctx = PrimeContext::default();
        let settings = PoolSettings {
            deadline: Duration::MAX,
            ..fast_settings()
        };
        let summary = WorkerPool::new(ctx, settings)
            .run(GenerationConfig::new(1, 100, 2))
            .await
            .expect("run");
        assert!(summary.completed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_collects_reports_from_every_worker() {
        let ctx = PrimeContext::default();
        let pool = WorkerPool::new(ctx.clone(), fast_settings());
        let summary = pool
            .run(GenerationConfig::new(3, 1_000, 5))
            .await
            .expect("run");

        assert!(summary.completed());
        assert_eq!(summary.workers.len(), 3);
        assert_eq!(summary.failed_workers, 0);
        assert_eq!(summary.primes_found, 15);
        assert!(summary.primes_found <= GenerationConfig::new(3, 1_000, 5).max_primes());
        assert_eq!(summary.set_size, 15);
        let ids: Vec<usize> = summary.workers.iter().map(|w| w.worker_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        // start + 15 announcements + summary
        assert_eq!(ctx.bus().message_count(), 17);
        assert_eq!(ctx.stats().snapshot().runs, 1);
    }

    #[tokio::test]
    async fn invalid_config_spawns_nothing() {
        let ctx = PrimeContext::default();
        let pool = WorkerPool::new(ctx.clone(), fast_settings());
        let err = pool
            .run(GenerationConfig::new(0, 1_000, 10))
            .await
            .expect_err("invalid");
        assert!(matches!(err, PrimeError::InvalidConfig(_)));
        assert_eq!(ctx.bus().message_count(), 0);
        assert_eq!(ctx.stats().snapshot().runs, 0);
    }
}
