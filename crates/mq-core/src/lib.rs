//! # mq-core
//!
//! Core types and invariants for verifying bounded blocking queues.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - `QueueHistory` and `BoundedQueueProperties`, the view of a queue
//!   that the property checker works against
//!
//! Nothing here depends on a particular queue implementation. The real
//! monitor queue, the deliberately broken variants and the simulation
//! runner all feed the same checker.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, QueueIssue, StateSnapshot, ThreadAction};
pub use invariants::{
    BoundedQueuePropertyChecker, BoundedQueueProperties, QueueHistory, QueueOpType,
    QueueOperation,
};
pub use property::{PropertyChecker, PropertyResult};
