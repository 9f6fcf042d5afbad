//! History-recording wrapper for property checking.
//!
//! Ordinals and lengths come from the monitor's receipts, taken under the
//! queue's own lock, so the history may be appended from any thread in
//! any order and still reflects the real linearization.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use mq_core::{BoundedQueueProperties, QueueHistory};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::queue::BoundedQueue;

/// `BoundedQueue<u64>` that records every operation.
pub struct TrackedQueue {
    queue: BoundedQueue<u64>,
    history: Mutex<QueueHistory>,
}

impl TrackedQueue {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Self::with_config(QueueConfig::with_capacity(capacity))
    }

    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        Ok(Self {
            queue: BoundedQueue::with_config(config)?,
            history: Mutex::new(QueueHistory::new()),
        })
    }

    /// The underlying queue. Operations made through it are not recorded.
    pub fn queue(&self) -> &BoundedQueue<u64> {
        &self.queue
    }

    fn record(&self, f: impl FnOnce(&mut QueueHistory)) {
        f(&mut self.history.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn put_inner(&self, thread_id: u64, item: u64, timeout: Option<Duration>) -> Result<(), QueueError> {
        match self.queue.put_with_receipt(item, timeout) {
            Ok(receipt) => {
                self.record(|h| h.record_put(thread_id, item, receipt.ordinal, receipt.len_after));
                Ok(())
            }
            Err(err) if err.kind() == QueueError::Closed => {
                self.record(|h| h.record_put_closed(thread_id, item));
                Err(QueueError::Closed)
            }
            Err(err) => {
                self.record(|h| h.record_abandoned(thread_id, Some(item)));
                Err(err.kind())
            }
        }
    }

    fn take_inner(&self, thread_id: u64, timeout: Option<Duration>) -> Result<u64, QueueError> {
        match self.queue.take_with_receipt(timeout) {
            Ok((item, receipt)) => {
                self.record(|h| h.record_take(thread_id, item, receipt.ordinal, receipt.len_after));
                Ok(item)
            }
            Err(QueueError::Closed) => {
                // Closed and drained: the removal count can no longer move.
                let taken = self.queue.total_taken();
                self.record(|h| h.record_take_closed(thread_id, taken));
                Err(QueueError::Closed)
            }
            Err(err) => {
                self.record(|h| h.record_abandoned(thread_id, None));
                Err(err)
            }
        }
    }

    pub fn put(&self, thread_id: u64, item: u64) -> Result<(), QueueError> {
        self.put_inner(thread_id, item, None)
    }

    pub fn try_put(&self, thread_id: u64, item: u64, timeout: Duration) -> Result<(), QueueError> {
        self.put_inner(thread_id, item, Some(timeout))
    }

    pub fn take(&self, thread_id: u64) -> Result<u64, QueueError> {
        self.take_inner(thread_id, None)
    }

    pub fn try_take(&self, thread_id: u64, timeout: Duration) -> Result<u64, QueueError> {
        self.take_inner(thread_id, Some(timeout))
    }

    pub fn close(&self, thread_id: u64) -> bool {
        let receipt = self.queue.close_with_receipt();
        self.record(|h| h.record_close(thread_id, receipt.accepted, receipt.remaining));
        receipt.transitioned
    }
}

impl BoundedQueueProperties for TrackedQueue {
    fn history(&self) -> QueueHistory {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.queue.to_vec()
    }

    fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use mq_core::{BoundedQueuePropertyChecker, PropertyChecker, QueueOpType};

    use super::*;

    fn assert_all_hold(queue: &TrackedQueue) {
        for result in BoundedQueuePropertyChecker::new(queue).check_all() {
            assert!(result.holds, "{}", result);
        }
    }

    #[test]
    fn test_sequential_history() {
        let q = TrackedQueue::new(2).unwrap();
        q.put(0, 1).unwrap();
        q.put(0, 2).unwrap();
        assert_eq!(q.try_put(0, 3, Duration::ZERO), Err(QueueError::Timeout));
        assert_eq!(q.take(1), Ok(1));
        assert!(q.close(0));
        assert_eq!(q.put(0, 4), Err(QueueError::Closed));
        assert_eq!(q.take(1), Ok(2));
        assert_eq!(q.take(1), Err(QueueError::Closed));

        let history = q.history();
        let kinds: Vec<QueueOpType> = history.operations.iter().map(|op| op.op_type).collect();
        assert_eq!(
            kinds,
            vec![
                QueueOpType::Put,
                QueueOpType::Put,
                QueueOpType::Abandoned,
                QueueOpType::Take,
                QueueOpType::Close,
                QueueOpType::PutClosed,
                QueueOpType::Take,
                QueueOpType::TakeClosed,
            ]
        );
        assert_eq!(history.accepted_at_close(), Some(2));
        assert_all_hold(&q);
    }

    #[test]
    fn test_concurrent_producers_consumers_hold_properties() {
        let q = Arc::new(TrackedQueue::new(3).unwrap());
        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..250 {
                        q.put(p, p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (10..13u64)
            .map(|c| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut taken = 0;
                    while q.take(c).is_ok() {
                        taken += 1;
                    }
                    taken
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        q.close(99);
        let taken: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();

        assert_eq!(taken, 1000);
        assert!(q.current_contents().is_empty());
        assert_all_hold(&q);
    }
}
