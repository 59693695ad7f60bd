use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PrimeError, Result};
use crate::oracle::PrimalityOracle;

/// Outcome of a bulk load. Bad entries are counted, never fatal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Values that were not in the set before and are now.
    pub added: usize,
    /// Primes that were already present (or repeated within the batch).
    pub duplicates: usize,
    /// Values rejected by the oracle.
    pub rejected: usize,
}

impl ImportReport {
    pub fn seen(&self) -> usize {
        self.added + self.duplicates + self.rejected
    }
}

/// Shared set of validated, unique primes.
///
/// Every read and write goes through one exclusive lock so a sorted snapshot
/// always reflects a single point in time. Inserting a value that is already
/// present is a no-op; inserting a non-prime is an error.
pub struct PrimeSet {
    oracle: Arc<PrimalityOracle>,
    inner: Mutex<HashSet<i64>>,
}

impl fmt::Debug for PrimeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.inner.try_lock().map(|guard| guard.len());
        f.debug_struct("PrimeSet")
            .field("len", &len)
            .field("oracle_cache_len", &self.oracle.cache_len())
            .finish()
    }
}

impl PrimeSet {
    pub fn new(oracle: Arc<PrimalityOracle>) -> Self {
        Self {
            oracle,
            inner: Mutex::new(HashSet::new()),
        }
    }

    pub fn oracle(&self) -> &Arc<PrimalityOracle> {
        &self.oracle
    }

    /// Inserts `n`, returning `Ok(true)` when the set changed and `Ok(false)`
    /// when `n` was already present.
    pub fn insert(&self, n: i64) -> Result<bool> {
        if !self.oracle.is_prime(n) {
            return Err(PrimeError::NotPrime(n));
        }
        Ok(self.inner.lock().insert(n))
    }

    pub fn contains(&self, n: i64) -> bool {
        self.inner.lock().contains(&n)
    }

    pub fn count(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn remove(&self, n: i64) -> bool {
        self.inner.lock().remove(&n)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Ascending copy of the current contents.
    pub fn snapshot_sorted(&self) -> Vec<i64> {
        let mut primes: Vec<i64> = {
            let guard = self.inner.lock();
            guard.iter().copied().collect()
        };
        primes.sort_unstable();
        primes
    }

    /// Uniformly random member, or `None` when empty.
    pub fn pick_random(&self) -> Option<i64> {
        let guard = self.inner.lock();
        guard.iter().copied().choose(&mut rand::rng())
    }

    /// Bulk-load entry point for importers. Applies the same validation and
    /// dedup rules as [`PrimeSet::insert`] but skips offending entries.
    ///
    /// Primality is checked before taking the lock; the whole batch is then
    /// applied under a single acquisition.
    pub fn import(&self, raw: &[i64]) -> ImportReport {
        let mut report = ImportReport::default();
        let candidates: Vec<i64> = raw
            .iter()
            .copied()
            .filter(|&n| {
                let prime = self.oracle.is_prime(n);
                if !prime {
                    report.rejected += 1;
                }
                prime
            })
            .collect();

        {
            let mut guard = self.inner.lock();
            for n in candidates {
                if guard.insert(n) {
                    report.added += 1;
                } else {
                    report.duplicates += 1;
                }
            }
        }

        debug!(
            target: "primevote::set",
            added = report.added,
            duplicates = report.duplicates,
            rejected = report.rejected,
            "bulk import applied"
        );
        report
    }
}
