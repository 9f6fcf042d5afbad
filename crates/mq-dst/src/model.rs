//! Sequential reference model of the queue.
//!
//! Simulated threads never block the OS thread, so every attempt has a
//! single expected outcome. Runners compare the real queue's outcome with
//! the model's after each step.

use std::collections::VecDeque;
use std::time::Duration;

use mq_queue::{BoundedQueue, BuggyQueue, QueueError, TrackedQueue};
use serde::Serialize;

/// Result of one non-blocking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    Accepted,
    Took(u64),
    /// The operation would have had to wait.
    Blocked,
    /// Put refused because the queue is closed.
    Refused,
    /// Take found the queue closed and empty.
    Drained,
    Closed { transitioned: bool },
}

impl Outcome {
    /// True when the attempt changed or finished something, i.e. the
    /// thread does not need to retry it.
    pub fn is_final(&self) -> bool {
        *self != Outcome::Blocked
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceQueue {
    capacity: usize,
    items: VecDeque<u64>,
    closed: bool,
}

impl ReferenceQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
            closed: false,
        }
    }

    pub fn put(&mut self, item: u64) -> Outcome {
        if self.closed {
            Outcome::Refused
        } else if self.items.len() >= self.capacity {
            Outcome::Blocked
        } else {
            self.items.push_back(item);
            Outcome::Accepted
        }
    }

    pub fn take(&mut self) -> Outcome {
        match self.items.pop_front() {
            Some(item) => Outcome::Took(item),
            None if self.closed => Outcome::Drained,
            None => Outcome::Blocked,
        }
    }

    pub fn close(&mut self) -> Outcome {
        let transitioned = !self.closed;
        self.closed = true;
        Outcome::Closed { transitioned }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contents(&self) -> Vec<u64> {
        self.items.iter().copied().collect()
    }
}

/// Queue surface the simulation drives. Attempts never block.
///
/// `thread` identifies the logical thread for implementations that record
/// histories; others ignore it.
pub trait DstTestableQueue: Send + Sync {
    fn try_put(&self, thread: u64, item: u64) -> Outcome;
    fn try_take(&self, thread: u64) -> Outcome;
    fn close(&self, thread: u64) -> Outcome;
    fn len(&self) -> usize;
    fn capacity(&self) -> usize;
    fn contents(&self) -> Vec<u64>;
}

fn put_outcome(result: Result<(), QueueError>) -> Outcome {
    match result {
        Ok(()) => Outcome::Accepted,
        Err(QueueError::Closed) => Outcome::Refused,
        Err(_) => Outcome::Blocked,
    }
}

fn take_outcome(result: Result<u64, QueueError>) -> Outcome {
    match result {
        Ok(item) => Outcome::Took(item),
        Err(QueueError::Closed) => Outcome::Drained,
        Err(_) => Outcome::Blocked,
    }
}

impl DstTestableQueue for BoundedQueue<u64> {
    fn try_put(&self, _thread: u64, item: u64) -> Outcome {
        put_outcome(BoundedQueue::try_put(self, item, Duration::ZERO).map_err(QueueError::from))
    }

    fn try_take(&self, _thread: u64) -> Outcome {
        take_outcome(BoundedQueue::try_take(self, Duration::ZERO))
    }

    fn close(&self, _thread: u64) -> Outcome {
        Outcome::Closed {
            transitioned: BoundedQueue::close(self),
        }
    }

    fn len(&self) -> usize {
        BoundedQueue::len(self)
    }

    fn capacity(&self) -> usize {
        BoundedQueue::capacity(self)
    }

    fn contents(&self) -> Vec<u64> {
        self.to_vec()
    }
}

impl DstTestableQueue for TrackedQueue {
    fn try_put(&self, thread: u64, item: u64) -> Outcome {
        put_outcome(TrackedQueue::try_put(self, thread, item, Duration::ZERO))
    }

    fn try_take(&self, thread: u64) -> Outcome {
        take_outcome(TrackedQueue::try_take(self, thread, Duration::ZERO))
    }

    fn close(&self, thread: u64) -> Outcome {
        Outcome::Closed {
            transitioned: TrackedQueue::close(self, thread),
        }
    }

    fn len(&self) -> usize {
        self.queue().len()
    }

    fn capacity(&self) -> usize {
        self.queue().capacity()
    }

    fn contents(&self) -> Vec<u64> {
        self.queue().to_vec()
    }
}

impl DstTestableQueue for BuggyQueue {
    fn try_put(&self, thread: u64, item: u64) -> Outcome {
        put_outcome(BuggyQueue::put(self, thread, item))
    }

    fn try_take(&self, thread: u64) -> Outcome {
        take_outcome(BuggyQueue::take(self, thread))
    }

    fn close(&self, thread: u64) -> Outcome {
        Outcome::Closed {
            transitioned: BuggyQueue::close(self, thread),
        }
    }

    fn len(&self) -> usize {
        self.contents().len()
    }

    fn capacity(&self) -> usize {
        mq_core::BoundedQueueProperties::capacity(self)
    }

    fn contents(&self) -> Vec<u64> {
        mq_core::BoundedQueueProperties::current_contents(self)
    }
}

#[cfg(test)]
mod tests {
    use mq_queue::QueueBug;

    use super::*;

    #[test]
    fn test_reference_queue_lifecycle() {
        let mut model = ReferenceQueue::new(1);
        assert_eq!(model.take(), Outcome::Blocked);
        assert_eq!(model.put(1), Outcome::Accepted);
        assert_eq!(model.put(2), Outcome::Blocked);
        assert_eq!(model.close(), Outcome::Closed { transitioned: true });
        assert_eq!(model.close(), Outcome::Closed { transitioned: false });
        assert_eq!(model.put(3), Outcome::Refused);
        assert_eq!(model.take(), Outcome::Took(1));
        assert_eq!(model.take(), Outcome::Drained);
        assert!(model.is_closed() && model.is_empty());
        assert!(!Outcome::Blocked.is_final());
        assert!(Outcome::Drained.is_final());
    }

    fn conforms<Q: DstTestableQueue>(queue: &Q, capacity: usize) -> bool {
        let mut model = ReferenceQueue::new(capacity);
        let script: [(u8, u64); 9] = [(0, 1), (0, 2), (0, 3), (1, 0), (0, 4), (2, 0), (0, 5), (1, 0), (1, 0)];
        script.iter().all(|&(op, item)| {
            let (real, expected) = match op {
                0 => (queue.try_put(0, item), model.put(item)),
                1 => (queue.try_take(1), model.take()),
                _ => (queue.close(0), model.close()),
            };
            real == expected && queue.contents() == model.contents()
        })
    }

    #[test]
    fn test_real_queues_conform() {
        assert!(conforms(&BoundedQueue::<u64>::new(2).unwrap(), 2));
        assert!(conforms(&TrackedQueue::new(2).unwrap(), 2));
    }

    #[test]
    fn test_buggy_queue_diverges() {
        assert!(!conforms(&BuggyQueue::new(QueueBug::Lifo, 2), 2));
        assert!(!conforms(&BuggyQueue::new(QueueBug::LeakyClose, 2), 2));
    }
}
