use std::sync::Arc;

use tracing::info;

use crate::bus::NotificationBus;
use crate::oracle::PrimalityOracle;
use crate::prime_set::PrimeSet;
use crate::queue::BoundedPrimeQueue;
use crate::stats::PrimeStats;

/// Topic name used when none is configured.
pub const DEFAULT_TOPIC: &str = "PrimesNotifications";
/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Shared state every worker and collaborator operates on.
///
/// Cloning is cheap: all members are reference counted, so a clone handed to
/// a worker observes the same oracle cache, set, queue, bus and counters.
#[derive(Clone, Debug)]
pub struct PrimeContext {
    oracle: Arc<PrimalityOracle>,
    primes: Arc<PrimeSet>,
    queue: Arc<BoundedPrimeQueue>,
    bus: Arc<NotificationBus>,
    stats: Arc<PrimeStats>,
}

impl Default for PrimeContext {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC, DEFAULT_QUEUE_CAPACITY)
    }
}

impl PrimeContext {
    pub fn new(topic: impl Into<String>, queue_capacity: usize) -> Self {
        let oracle = Arc::new(PrimalityOracle::new());
        Self {
            primes: Arc::new(PrimeSet::new(Arc::clone(&oracle))),
            queue: Arc::new(BoundedPrimeQueue::new(Arc::clone(&oracle), queue_capacity)),
            bus: Arc::new(NotificationBus::new(topic)),
            stats: Arc::new(PrimeStats::new()),
            oracle,
        }
    }

    pub fn oracle(&self) -> &Arc<PrimalityOracle> {
        &self.oracle
    }

    pub fn primes(&self) -> &Arc<PrimeSet> {
        &self.primes
    }

    pub fn queue(&self) -> &Arc<BoundedPrimeQueue> {
        &self.queue
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn stats(&self) -> &Arc<PrimeStats> {
        &self.stats
    }

    /// Returns every component to its freshly constructed state: set, queue
    /// and its operation count, oracle cache, stats and the bus publish
    /// count. Bus subscriptions are kept; they belong to the observers, not
    /// the data.
    pub fn reset(&self) {
        self.primes.clear();
        self.queue.reset();
        self.oracle.clear_cache();
        self.stats.reset();
        self.bus.reset_count();
        info!(target: "primevote::context", "prime context reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_share_one_oracle() {
        let ctx = PrimeContext::new("shared", 8);
        ctx.primes().insert(101).expect("prime");
        ctx.queue().offer(103).expect("prime");
        assert_eq!(ctx.oracle().cache_len(), 2);
        assert!(Arc::ptr_eq(ctx.primes().oracle(), ctx.oracle()));
        assert_eq!(ctx.queue().capacity(), 8);
        assert_eq!(ctx.bus().topic(), "shared");
    }

    #[test]
    fn reset_empties_state_but_keeps_subscribers() {
        let ctx = PrimeContext::default();
        ctx.bus().subscribe(Arc::new(crate::bus::TracingListener));
        ctx.primes().import(&[2, 3, 5]);
        ctx.queue().offer(7).expect("prime");
        assert_eq!(ctx.queue().poll(), 7);
        ctx.queue().offer(11).expect("prime");
        ctx.bus().publish_text("x");
        ctx.stats().record_prime_generated(2);

        let clone = ctx.clone();
        clone.reset();

        let fresh = PrimeContext::default();
        assert!(ctx.primes().is_empty());
        assert!(ctx.queue().is_empty());
        assert_eq!(ctx.queue().operations_count(), fresh.queue().operations_count());
        assert_eq!(ctx.queue().operations_count(), 0);
        assert_eq!(ctx.bus().message_count(), fresh.bus().message_count());
        assert_eq!(ctx.bus().message_count(), 0);
        assert_eq!(ctx.oracle().cache_len(), 0);
        assert_eq!(ctx.stats().primes_generated(), 0);
        assert_eq!(ctx.bus().subscribers_count(), 1);
    }
}
