//! Intentionally broken queues.
//!
//! Each variant breaks one contract of the monitor queue so the property
//! checker can be shown to catch it. They never block: where a correct
//! queue would wait, these report `Timeout`.
//!
//! | Bug | Caught by |
//! |-----|-----------|
//! | `DropOldestWhenFull` | NoLostItems, FifoOrder |
//! | `Lifo` | FifoOrder |
//! | `IgnoreCapacity` | BoundedCapacity |
//! | `LeakyClose` | NoPutAfterClose, DrainBeforeClosed |

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use mq_core::{BoundedQueueProperties, QueueHistory};

use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBug {
    /// BUG: a put on a full queue evicts the head instead of waiting.
    DropOldestWhenFull,
    /// BUG: take removes from the tail.
    Lifo,
    /// BUG: the capacity check is missing.
    IgnoreCapacity,
    /// BUG: close only stops consumers. Puts keep being accepted and
    /// `take` reports `Closed` while items remain.
    LeakyClose,
}

struct Inner {
    items: VecDeque<(u64, u64)>,
    closed: bool,
    inserted: u64,
    removed: u64,
    history: QueueHistory,
}

pub struct BuggyQueue {
    bug: QueueBug,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl BuggyQueue {
    #[must_use]
    pub fn new(bug: QueueBug, capacity: usize) -> Self {
        Self {
            bug,
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
                inserted: 0,
                removed: 0,
                history: QueueHistory::new(),
            }),
        }
    }

    pub fn bug(&self) -> QueueBug {
        self.bug
    }

    pub fn put(&self, thread_id: u64, item: u64) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed && self.bug != QueueBug::LeakyClose {
            inner.history.record_put_closed(thread_id, item);
            return Err(QueueError::Closed);
        }
        if inner.items.len() >= self.capacity {
            match self.bug {
                QueueBug::DropOldestWhenFull => {
                    inner.items.pop_front();
                }
                QueueBug::IgnoreCapacity => {}
                _ => {
                    inner.history.record_abandoned(thread_id, Some(item));
                    return Err(QueueError::Timeout);
                }
            }
        }

        let ordinal = inner.inserted;
        inner.inserted += 1;
        inner.items.push_back((item, ordinal));
        let len = inner.items.len();
        inner.history.record_put(thread_id, item, ordinal, len);
        Ok(())
    }

    pub fn take(&self, thread_id: u64) -> Result<u64, QueueError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed && (inner.items.is_empty() || self.bug == QueueBug::LeakyClose) {
            let taken = inner.removed;
            inner.history.record_take_closed(thread_id, taken);
            return Err(QueueError::Closed);
        }
        let next = match self.bug {
            QueueBug::Lifo => inner.items.pop_back(),
            _ => inner.items.pop_front(),
        };
        let Some((item, _)) = next else {
            inner.history.record_abandoned(thread_id, None);
            return Err(QueueError::Timeout);
        };

        let ordinal = inner.removed;
        inner.removed += 1;
        let len = inner.items.len();
        inner.history.record_take(thread_id, item, ordinal, len);
        Ok(item)
    }

    pub fn close(&self, thread_id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let transitioned = !inner.closed;
        inner.closed = true;
        let (accepted, len) = (inner.inserted, inner.items.len());
        inner.history.record_close(thread_id, accepted, len);
        transitioned
    }
}

impl BoundedQueueProperties for BuggyQueue {
    fn history(&self) -> QueueHistory {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .iter()
            .map(|(item, _)| *item)
            .collect()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
