//! Capacity-limited blocking FIFO of primes.
//!
//! Producers block while the queue is full and consumers block while it is
//! empty. Blocked callers line up by ticket and are served strictly in the
//! order they started waiting, so a steady stream of newcomers cannot starve
//! an early waiter. Cancellable and deadline-bounded variants re-check their
//! stop condition at a short interval while parked.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::error::{PrimeError, Result};
use crate::oracle::PrimalityOracle;

/// Upper bound on how long a cancellable waiter sleeps between checks of its
/// token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Producer,
    Consumer,
}

#[derive(Clone, Copy, Debug, Default)]
struct WaitPolicy<'a> {
    token: Option<&'a CancellationToken>,
    deadline: Option<(Instant, Duration)>,
}

impl<'a> WaitPolicy<'a> {
    fn forever() -> Self {
        Self::default()
    }

    fn cancellable(token: &'a CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    fn timeout(timeout: Duration) -> Self {
        Self {
            token: None,
            deadline: Some((Instant::now() + timeout, timeout)),
        }
    }

    fn is_unbounded(&self) -> bool {
        self.token.is_none() && self.deadline.is_none()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<i64>,
    producers: VecDeque<u64>,
    consumers: VecDeque<u64>,
    next_ticket: u64,
    operations: u64,
}

impl QueueState {
    fn line(&self, role: Role) -> &VecDeque<u64> {
        match role {
            Role::Producer => &self.producers,
            Role::Consumer => &self.consumers,
        }
    }

    fn line_mut(&mut self, role: Role) -> &mut VecDeque<u64> {
        match role {
            Role::Producer => &mut self.producers,
            Role::Consumer => &mut self.consumers,
        }
    }
}

/// Blocking FIFO of validated primes with an optional capacity.
///
/// A capacity of `0` means unbounded; `offer` then never blocks.
#[derive(Debug)]
pub struct BoundedPrimeQueue {
    oracle: Arc<PrimalityOracle>,
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl BoundedPrimeQueue {
    pub fn new(oracle: Arc<PrimalityOracle>, capacity: usize) -> Self {
        Self {
            oracle,
            capacity,
            state: Mutex::new(QueueState::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn unbounded(oracle: Arc<PrimalityOracle>) -> Self {
        Self::new(oracle, 0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `prime`, blocking while the queue is full.
    pub fn offer(&self, prime: i64) -> Result<()> {
        self.offer_with(prime, WaitPolicy::forever())
    }

    /// Like [`offer`](Self::offer) but gives up with
    /// [`PrimeError::Cancelled`] once `token` fires.
    pub fn offer_cancellable(&self, prime: i64, token: &CancellationToken) -> Result<()> {
        self.offer_with(prime, WaitPolicy::cancellable(token))
    }

    /// Removes and returns the head, blocking while the queue is empty.
    pub fn poll(&self) -> i64 {
        match self.poll_with(WaitPolicy::forever()) {
            Ok(prime) => prime,
            // An unbounded wait has no way to fail.
            Err(_) => unreachable!("unbounded poll returned an error"),
        }
    }

    pub fn poll_cancellable(&self, token: &CancellationToken) -> Result<i64> {
        self.poll_with(WaitPolicy::cancellable(token))
    }

    /// Waits at most `timeout` for an element.
    pub fn poll_timeout(&self, timeout: Duration) -> Result<i64> {
        self.poll_with(WaitPolicy::timeout(timeout))
    }

    /// Validates every element, then appends as many as fit without waiting.
    /// Returns the number actually added. Nothing is enqueued when any element
    /// is not prime.
    ///
    /// Free slots are reserved for producers already blocked in `offer`, so
    /// the batch only gets `capacity - len - waiting_producers` slots. It can
    /// add nothing even while `len() < capacity`.
    pub fn offer_batch(&self, primes: &[i64]) -> Result<usize> {
        if let Some(&bad) = primes.iter().find(|&&n| !self.oracle.is_prime(n)) {
            return Err(PrimeError::NotPrime(bad));
        }

        let mut state = self.state.lock();
        let room = if self.capacity == 0 {
            primes.len()
        } else {
            // Blocked producers keep their claim on any space that frees up.
            self.capacity
                .saturating_sub(state.items.len())
                .saturating_sub(state.producers.len())
        };
        let added = room.min(primes.len());
        if added < primes.len() {
            warn!(
                target: "primevote::queue",
                requested = primes.len(),
                added,
                capacity = self.capacity,
                "not enough room for the whole batch; enqueueing what fits"
            );
        }

        state.items.extend(primes[..added].iter().copied());
        state.operations += added as u64;
        trace!(target: "primevote::queue", added, len = state.items.len(), "batch offered");

        if added > 0 {
            self.not_empty.notify_all();
        }
        Ok(added)
    }

    /// Blocks until at least one element is present, then drains up to `max`
    /// elements without waiting for more. A `max` of zero is treated as one.
    pub fn poll_batch(&self, max: usize) -> Vec<i64> {
        match self.poll_batch_with(max, WaitPolicy::forever()) {
            Ok(batch) => batch,
            Err(_) => unreachable!("unbounded poll_batch returned an error"),
        }
    }

    pub fn poll_batch_cancellable(&self, max: usize, token: &CancellationToken) -> Result<Vec<i64>> {
        self.poll_batch_with(max, WaitPolicy::cancellable(token))
    }

    pub fn peek(&self) -> Option<i64> {
        self.state.lock().items.front().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Cumulative number of elements offered plus elements polled.
    pub fn operations_count(&self) -> u64 {
        self.state.lock().operations
    }

    pub fn waiting_producers(&self) -> usize {
        self.state.lock().producers.len()
    }

    pub fn waiting_consumers(&self) -> usize {
        self.state.lock().consumers.len()
    }

    /// Drops every queued element and wakes blocked producers.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.items.len();
        state.items.clear();
        trace!(target: "primevote::queue", dropped, "queue cleared");
        self.not_full.notify_all();
    }

    /// Like [`clear`](Self::clear), and also zeroes the operation counter.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        state.operations = 0;
        trace!(target: "primevote::queue", "queue reset");
        self.not_full.notify_all();
    }

    fn offer_with(&self, prime: i64, policy: WaitPolicy<'_>) -> Result<()> {
        if !self.oracle.is_prime(prime) {
            return Err(PrimeError::NotPrime(prime));
        }

        let mut state = self.state.lock();
        self.wait_turn(&mut state, Role::Producer, policy)?;

        state.items.push_back(prime);
        state.operations += 1;
        trace!(target: "primevote::queue", prime, len = state.items.len(), "prime offered");

        self.not_empty.notify_all();
        if self.has_room(&state) && !state.producers.is_empty() {
            self.not_full.notify_all();
        }
        Ok(())
    }

    fn poll_with(&self, policy: WaitPolicy<'_>) -> Result<i64> {
        let mut batch = self.poll_batch_with(1, policy)?;
        batch
            .pop()
            .ok_or_else(|| PrimeError::Internal("consumer admitted to an empty queue".into()))
    }

    fn poll_batch_with(&self, max: usize, policy: WaitPolicy<'_>) -> Result<Vec<i64>> {
        let max = max.max(1);
        let mut state = self.state.lock();
        self.wait_turn(&mut state, Role::Consumer, policy)?;

        let take = max.min(state.items.len());
        let batch: Vec<i64> = state.items.drain(..take).collect();
        state.operations += batch.len() as u64;
        trace!(target: "primevote::queue", taken = batch.len(), len = state.items.len(), "primes polled");

        if !state.producers.is_empty() {
            self.not_full.notify_all();
        }
        if !state.items.is_empty() && !state.consumers.is_empty() {
            self.not_empty.notify_all();
        }
        Ok(batch)
    }

    fn has_room(&self, state: &QueueState) -> bool {
        self.capacity == 0 || state.items.len() < self.capacity
    }

    fn is_ready(&self, state: &QueueState, role: Role) -> bool {
        match role {
            Role::Producer => self.has_room(state),
            Role::Consumer => !state.items.is_empty(),
        }
    }

    /// Parks the caller until it is first in line for `role` and the queue
    /// can serve it. On success the caller's ticket has been retired and the
    /// lock is still held.
    fn wait_turn(
        &self,
        state: &mut MutexGuard<'_, QueueState>,
        role: Role,
        policy: WaitPolicy<'_>,
    ) -> Result<()> {
        if state.line(role).is_empty() && self.is_ready(state, role) {
            return Ok(());
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.line_mut(role).push_back(ticket);

        let condvar = match role {
            Role::Producer => &self.not_full,
            Role::Consumer => &self.not_empty,
        };

        loop {
            if state.line(role).front() == Some(&ticket) && self.is_ready(state, role) {
                state.line_mut(role).pop_front();
                return Ok(());
            }

            if let Some(token) = policy.token
                && token.is_cancelled()
            {
                self.leave_line(state, role, ticket, condvar);
                return Err(PrimeError::Cancelled(format!("{role:?} wait on prime queue")));
            }

            let now = Instant::now();
            if let Some((deadline, timeout)) = policy.deadline
                && now >= deadline
            {
                self.leave_line(state, role, ticket, condvar);
                return Err(PrimeError::Timeout(timeout));
            }

            if policy.is_unbounded() {
                condvar.wait(state);
            } else {
                let slice = match policy.deadline {
                    Some((deadline, _)) => CANCEL_POLL_INTERVAL.min(deadline - now),
                    None => CANCEL_POLL_INTERVAL,
                };
                let _ = condvar.wait_for(state, slice);
            }
        }
    }

    fn leave_line(
        &self,
        state: &mut MutexGuard<'_, QueueState>,
        role: Role,
        ticket: u64,
        condvar: &Condvar,
    ) {
        state.line_mut(role).retain(|&t| t != ticket);
        trace!(target: "primevote::queue", ?role, ticket, "waiter left the line");
        // Whoever was behind us may now be first.
        condvar.notify_all();
    }
}
