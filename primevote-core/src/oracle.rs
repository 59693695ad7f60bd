//! Memoized primality test shared by every worker.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Trial-division primality oracle backed by a concurrent memo table.
///
/// The table only grows; call [`PrimalityOracle::clear_cache`] to reset it.
/// Two threads racing on the same cold key both compute the answer and both
/// store it, which is harmless because the result is identical.
#[derive(Debug, Default)]
pub struct PrimalityOracle {
    cache: DashMap<i64, bool>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PrimalityOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `n` is prime. Total over `i64`: anything below 2 is
    /// not prime.
    pub fn is_prime(&self, n: i64) -> bool {
        if n < 2 {
            return false;
        }

        if let Some(cached) = self.cache.get(&n) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *cached;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Computed outside the shard lock so slow keys never block readers.
        let verdict = trial_division(n);
        self.cache.insert(n, verdict);
        verdict
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Drops every memoized verdict and zeroes the hit/miss counters.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// 6k±1 wheel: after ruling out 2 and 3 every remaining prime factor
/// candidate sits next to a multiple of six.
fn trial_division(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    if n <= 3 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    let mut i: i64 = 5;
    // i <= n / i avoids overflowing i * i near i64::MAX.
    while i <= n / i {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn known_values() {
        let oracle = PrimalityOracle::new();
        assert!(oracle.is_prime(2));
        assert!(oracle.is_prime(3));
        assert!(oracle.is_prime(97));
        assert!(!oracle.is_prime(1));
        assert!(!oracle.is_prime(100));
        assert!(!oracle.is_prime(25));
        assert!(!oracle.is_prime(49));
        assert!(oracle.is_prime(7919));
    }

    #[test]
    fn non_positive_inputs_are_never_prime() {
        let oracle = PrimalityOracle::new();
        for n in [i64::MIN, -97, -2, -1, 0, 1] {
            assert!(!oracle.is_prime(n), "{n} must not be prime");
        }
        // Trivial rejections never touch the memo table.
        assert_eq!(oracle.cache_len(), 0);
    }

    #[test]
    fn matches_naive_definition_below_two_thousand() {
        let oracle = PrimalityOracle::new();
        for n in 0..2_000_i64 {
            let naive = n >= 2 && (2..n).all(|d| n % d != 0);
            assert_eq!(oracle.is_prime(n), naive, "mismatch for {n}");
        }
    }

    #[test]
    fn large_values_do_not_overflow() {
        let oracle = PrimalityOracle::new();
        // Largest prime below 2^31.
        assert!(oracle.is_prime(2_147_483_647));
        assert!(!oracle.is_prime(i64::MAX));
    }

    #[test]
    fn cache_records_hits_and_can_be_cleared() {
        let oracle = PrimalityOracle::new();
        assert!(oracle.is_prime(101));
        assert!(oracle.is_prime(101));
        assert!(!oracle.is_prime(102));

        assert_eq!(oracle.cache_len(), 2);
        assert_eq!(oracle.cache_misses(), 2);
        assert_eq!(oracle.cache_hits(), 1);

        oracle.clear_cache();
        assert_eq!(oracle.cache_len(), 0);
        assert_eq!(oracle.cache_hits(), 0);
        assert!(oracle.is_prime(101));
        assert_eq!(oracle.cache_misses(), 1);
    }

    #[test]
    fn concurrent_lookups_agree() {
        let oracle = Arc::new(PrimalityOracle::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let oracle = Arc::clone(&oracle);
                thread::spawn(move || {
                    (2..500_i64).map(|n| oracle.is_prime(n)).collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<bool>> = handles
            .into_iter()
            .map(|h| h.join().expect("oracle thread panicked"))
            .collect();
        for other in &results[1..] {
            assert_eq!(&results[0], other);
        }
        assert_eq!(oracle.cache_len(), 498);
    }
}
