use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Process-wide counters fed by workers and the pool.
#[derive(Debug, Default)]
pub struct PrimeStats {
    primes_generated: AtomicU64,
    processing_ms: AtomicU64,
    runs: AtomicU64,
    frequency: DashMap<i64, u64>,
}

/// Point-in-time copy of [`PrimeStats`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub primes_generated: u64,
    pub processing_ms: u64,
    pub runs: u64,
    /// Most frequently generated primes, highest count first.
    pub top: Vec<(i64, u64)>,
}

impl PrimeStats {
    pub const DEFAULT_TOP: usize = 5;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_prime_generated(&self, prime: i64) {
        self.primes_generated.fetch_add(1, Ordering::Relaxed);
        *self.frequency.entry(prime).or_insert(0) += 1;
    }

    pub fn record_run(&self, elapsed: Duration) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.processing_ms.fetch_add(millis, Ordering::Relaxed);
    }

    pub fn primes_generated(&self) -> u64 {
        self.primes_generated.load(Ordering::Relaxed)
    }

    pub fn processing_ms(&self) -> u64 {
        self.processing_ms.load(Ordering::Relaxed)
    }

    /// The `limit` most frequent primes. Ties break toward the smaller prime
    /// so output is stable.
    pub fn top(&self, limit: usize) -> Vec<(i64, u64)> {
        let mut entries: Vec<(i64, u64)> = self
            .frequency
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            primes_generated: self.primes_generated(),
            processing_ms: self.processing_ms(),
            runs: self.runs.load(Ordering::Relaxed),
            top: self.top(Self::DEFAULT_TOP),
        }
    }

    pub fn reset(&self) {
        self.primes_generated.store(0, Ordering::Relaxed);
        self.processing_ms.store(0, Ordering::Relaxed);
        self.runs.store(0, Ordering::Relaxed);
        self.frequency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_ranks_generated_primes() {
        let stats = PrimeStats::new();
        for p in [7, 3, 7, 11, 3, 7] {
            stats.record_prime_generated(p);
        }
        stats.record_run(Duration::from_millis(120));
        stats.record_run(Duration::from_millis(30));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.primes_generated, 6);
        assert_eq!(snapshot.processing_ms, 150);
        assert_eq!(snapshot.runs, 2);
        assert_eq!(snapshot.top, vec![(7, 3), (3, 2), (11, 1)]);
        assert_eq!(stats.top(1), vec![(7, 3)]);
    }

    #[test]
    fn reset_clears_everything() {
        let stats = PrimeStats::new();
        stats.record_prime_generated(2);
        stats.record_run(Duration::from_secs(1));
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
