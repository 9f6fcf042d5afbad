//! # mq-dst
//!
//! Deterministic simulation testing for the bounded blocking queue.
//!
//! Time, randomness, scheduling and faults all derive from one seed, so
//! every run is reproducible. Logical producer and consumer threads are
//! interleaved on a single OS thread; blocking is modelled as a
//! non-blocking attempt that is retried when the thread is scheduled
//! again, and timeouts run on the simulated clock.
//!
//! ## Harnesses
//!
//! - `fault_injection`: one operation at a time with faults at its
//!   boundaries, checked against the reference model
//! - `harness`: producers and consumers interleaved by the scheduler
//! - `oracle_scheduler`: replay of interleavings found by model checking
//!
//! ## Usage
//!
//! ```rust
//! use mq_dst::{DstHarness, HarnessConfig};
//! use mq_queue::BoundedQueue;
//!
//! let config = HarnessConfig::quick();
//! let queue = BoundedQueue::<u64>::new(config.capacity).unwrap();
//! let result = DstHarness::new(12345, config).run(&queue);
//! assert!(result.all_invariants_held, "{}", result.format());
//! ```
//!
//! ## Reproducibility
//!
//! ```bash
//! DST_SEED=12345 cargo test -p mq-dst
//! ```

pub mod clock;
pub mod env;
pub mod fault;
pub mod fault_injection;
pub mod harness;
pub mod model;
pub mod oracle_scheduler;
pub mod random;
pub mod scheduler;

pub use clock::SimClock;
pub use env::DstEnv;
pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use fault_injection::{random_ops, run_dst_scenario, DstOp, DstResult, DstRunner, DstStats, FaultPoint, FaultType};
pub use harness::{item_for, DstHarness, HarnessConfig, HarnessResult};
pub use model::{DstTestableQueue, Outcome, ReferenceQueue};
pub use oracle_scheduler::{
    replay_oracle, run_all_oracles, OracleAction, OracleReplayResult, OracleScheduler, OracleSchedulerStats,
    OracleStep, OracleTrace,
};
pub use random::DeterministicRng;
pub use scheduler::{ScheduleDecision, Scheduler};

/// Seed from `DST_SEED`, or a fresh random one.
///
/// The seed is logged so a failing run can be reproduced. An unparsable
/// `DST_SEED` is reported and replaced by a random seed.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("DST_SEED").map(|s| s.trim().parse::<u64>()) {
        Ok(Ok(seed)) => {
            tracing::info!(seed, "DST_SEED from environment");
            seed
        }
        Ok(Err(error)) => {
            let seed = rand::random::<u64>();
            tracing::warn!(%error, seed, "DST_SEED is not a valid u64, using a random seed");
            seed
        }
        Err(_) => {
            let seed = rand::random::<u64>();
            tracing::info!(seed, "DST_SEED randomly generated");
            seed
        }
    }
}
