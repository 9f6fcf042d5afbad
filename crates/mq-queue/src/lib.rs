//! # mq-queue
//!
//! A bounded, thread-safe, multi-producer multi-consumer blocking queue.
//!
//! The queue is a monitor: one mutex guards a fixed-capacity ring buffer
//! and the open/closed flag, and two condition variables (`not_full`,
//! `not_empty`) park producers and consumers.
//!
//! - `put` / `take` block until they can proceed or the queue closes
//! - `try_put` / `try_take` bound the wait and fail with `Timeout`
//! - `*_cancellable` variants stop waiting when a `CancellationToken` fires
//! - `close` is idempotent, refuses further puts and wakes every waiter;
//!   consumers drain what is left before seeing `Closed`
//!
//! ## Verification support
//!
//! - `tracked`: `TrackedQueue` records a history for `mq_core`'s checker
//! - `buggy_queues`: broken variants the checker must reject
//! - loom models under `--cfg loom`, kani proofs under `cfg(kani)`

pub mod buggy_queues;
pub mod cancel;
pub mod config;
pub mod error;
mod kani_proofs;
pub mod lifecycle;
mod monitor;
pub mod queue;
pub mod storage;
mod sync;
pub mod tracked;

pub use buggy_queues::{BuggyQueue, QueueBug};
pub use cancel::CancellationToken;
pub use config::{QueueConfig, WakePolicy};
pub use error::{PutError, QueueError};
pub use lifecycle::QueueState;
pub use queue::{BoundedQueue, Iter};
pub use storage::SlotStorage;
pub use tracked::TrackedQueue;
