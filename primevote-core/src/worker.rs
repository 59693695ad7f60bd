use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::context::PrimeContext;

/// Longest uninterrupted sleep inside a worker pause; the stop signal is
/// re-checked between slices.
const PAUSE_SLICE: Duration = Duration::from_millis(5);

/// Where a [`GenerationWorker`] is in its sample/test/insert cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Sampling,
    Testing(i64),
    Inserting(i64),
    Discarding(i64),
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// Reached its target count.
    Completed,
    /// Stopped by the cancellation token first.
    Cancelled,
}

/// Tuning for a single worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Inclusive upper end of the sampling range; the lower end is 2.
    pub upper_bound: i64,
    /// Distinct primes this worker must add before it stops.
    pub target: usize,
    /// Pause between iterations. Zero yields the thread instead.
    pub pause: Duration,
    /// Base seed for reproducible sampling; each worker offsets it by its id.
    pub seed: Option<u64>,
    /// Publish a notification for every prime this worker adds.
    pub announce_primes: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            upper_bound: 1_000,
            target: 10,
            pause: Duration::from_millis(10),
            seed: None,
            announce_primes: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub found: usize,
    pub iterations: u64,
    pub outcome: WorkerOutcome,
    /// Primes this worker added, in discovery order.
    pub primes: Vec<i64>,
    pub elapsed_ms: u64,
}

/// Samples random candidates and adds the primes it discovers to the shared
/// set until it reaches its target or is told to stop.
pub struct GenerationWorker {
    id: usize,
    ctx: PrimeContext,
    settings: WorkerSettings,
    token: CancellationToken,
    rng: StdRng,
    state: WorkerState,
    iterations: u64,
    primes: Vec<i64>,
}

impl fmt::Debug for GenerationWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationWorker")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("iterations", &self.iterations)
            .field("found", &self.primes.len())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl GenerationWorker {
    pub fn new(
        id: usize,
        ctx: PrimeContext,
        settings: WorkerSettings,
        token: CancellationToken,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            id,
            ctx,
            settings,
            token,
            rng,
            state: WorkerState::Idle,
            iterations: 0,
            primes: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn found(&self) -> usize {
        self.primes.len()
    }

    /// Advances the state machine by one transition and returns the new
    /// state. Calling it after `Done` is a no-op.
    pub fn step(&mut self) -> WorkerState {
        let current = self.state;
        self.state = match current {
            WorkerState::Idle => WorkerState::Sampling,
            WorkerState::Sampling => self.sample(),
            WorkerState::Testing(candidate) => self.test(candidate),
            WorkerState::Inserting(candidate) => {
                self.insert(candidate);
                self.pause();
                WorkerState::Sampling
            }
            WorkerState::Discarding(candidate) => {
                trace!(target: "primevote::worker", worker = self.id, candidate, "candidate discarded");
                self.pause();
                WorkerState::Sampling
            }
            WorkerState::Done => WorkerState::Done,
        };
        self.state
    }

    /// Drives the worker to completion on the current thread.
    pub fn run(mut self) -> WorkerReport {
        let started = Instant::now();
        info!(
            target: "primevote::worker",
            worker = self.id,
            upper_bound = self.settings.upper_bound,
            target_count = self.settings.target,
            "worker started"
        );

        while self.step() != WorkerState::Done {}

        let outcome = if self.primes.len() >= self.settings.target {
            WorkerOutcome::Completed
        } else {
            WorkerOutcome::Cancelled
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            target: "primevote::worker",
            worker = self.id,
            found = self.primes.len(),
            iterations = self.iterations,
            ?outcome,
            elapsed_ms,
            "worker finished"
        );

        WorkerReport {
            worker_id: self.id,
            found: self.primes.len(),
            iterations: self.iterations,
            outcome,
            primes: self.primes,
            elapsed_ms,
        }
    }

    fn sample(&mut self) -> WorkerState {
        if self.token.is_cancelled() || self.primes.len() >= self.settings.target {
            return WorkerState::Done;
        }
        self.iterations += 1;
        let upper = self.settings.upper_bound.max(2);
        WorkerState::Testing(self.rng.random_range(2..=upper))
    }

    fn test(&self, candidate: i64) -> WorkerState {
        if self.ctx.oracle().is_prime(candidate) && !self.ctx.primes().contains(candidate) {
            WorkerState::Inserting(candidate)
        } else {
            WorkerState::Discarding(candidate)
        }
    }

    fn insert(&mut self, candidate: i64) {
        match self.ctx.primes().insert(candidate) {
            Ok(true) => {
                self.primes.push(candidate);
                self.ctx.stats().record_prime_generated(candidate);
                debug!(target: "primevote::worker", worker = self.id, prime = candidate, "prime added");
                if self.settings.announce_primes {
                    self.ctx
                        .bus()
                        .publish(format!("worker {} added a prime", self.id), Some(candidate));
                }
            }
            // Another worker won the race between `contains` and `insert`.
            Ok(false) => {
                trace!(target: "primevote::worker", worker = self.id, prime = candidate, "lost insert race");
            }
            Err(err) => {
                warn!(target: "primevote::worker", worker = self.id, error = %err, "insert rejected");
            }
        }
    }

    fn pause(&self) {
        if self.settings.pause.is_zero() {
            thread::yield_now();
            return;
        }
        let deadline = Instant::now() + self.settings.pause;
        loop {
            if self.token.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(PAUSE_SLICE.min(deadline - now));
        }
    }
}
