//! Invariant traits for bounded blocking queues.
//!
//! - `bounded_queue`: NoLostItems, FifoOrder, BoundedCapacity,
//!   NoPutAfterClose, DrainBeforeClosed

pub mod bounded_queue;

pub use bounded_queue::{
    BoundedQueuePropertyChecker, BoundedQueueProperties, QueueHistory, QueueOpType,
    QueueOperation,
};
