//! # Primevote Core
//!
//! Concurrency substrate behind the `primevote` tool: parallel prime
//! discovery over shared, validated state.
//!
//! ## Overview
//!
//! - **Primality**: [`PrimalityOracle`] memoizes a 6k±1 trial division test.
//! - **Prime set**: [`PrimeSet`] holds unique, validated primes behind one lock.
//! - **Queue**: [`BoundedPrimeQueue`] is a capacity-limited blocking FIFO with
//!   batch operations and cancellable waits served in arrival order.
//! - **Notifications**: [`NotificationBus`] fans status messages out to
//!   subscribers and isolates failing ones.
//! - **Generation**: [`GenerationWorker`] samples candidates until it reaches
//!   its target; [`WorkerPool`] runs a group of them under one deadline.
//!
//! Shared state is bundled in a [`PrimeContext`] that is cloned into every
//! worker. [`files`] and [`PrimeStats`] sit on top of it.
//!
//! ## Example
//!
//! ```no_run
//! use primevote_core::{GenerationConfig, PoolSettings, PrimeContext, WorkerPool};
//!
//! # async fn demo() -> primevote_core::Result<()> {
//! let ctx = PrimeContext::default();
//! let pool = WorkerPool::new(ctx.clone(), PoolSettings::default());
//! let summary = pool.run(GenerationConfig::new(4, 1_000, 10)).await?;
//! println!("{} primes, completed: {}", summary.primes_found, summary.completed());
//! println!("{:?}", ctx.primes().snapshot_sorted());
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod context;
pub mod error;
pub mod files;
pub mod oracle;
pub mod pool;
pub mod prime_set;
pub mod queue;
pub mod stats;
pub mod worker;

pub use bus::{
    ListenerHandle, MessageListener, Notification, NotificationBus, PublishReport,
    TracingListener, listener,
};
pub use context::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TOPIC, PrimeContext};
pub use error::{PrimeError, Result};
pub use oracle::PrimalityOracle;
pub use pool::{GenerationConfig, PoolSettings, RunStatus, RunSummary, WorkerPool};
pub use prime_set::{ImportReport, PrimeSet};
pub use queue::BoundedPrimeQueue;
pub use stats::{PrimeStats, StatsSnapshot};
pub use worker::{GenerationWorker, WorkerOutcome, WorkerReport, WorkerSettings, WorkerState};
