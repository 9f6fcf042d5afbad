//! `BoundedQueue<T>`, the public handle.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::cancel::{CancellationToken, WakeAll};
use crate::config::QueueConfig;
use crate::error::{PutError, QueueError};
use crate::lifecycle::QueueState;
use crate::monitor::{CloseReceipt, Monitor, Receipt, WaitBudget};

/// Bounded multi-producer multi-consumer blocking queue.
///
/// Cloning the handle shares the queue. Items come out in the order they
/// went in. Which of several blocked threads wakes first is unspecified.
///
/// # Example
///
/// ```
/// use std::thread;
/// use mq_queue::{BoundedQueue, QueueError};
///
/// let queue = BoundedQueue::new(2)?;
/// let consumer = {
///     let queue = queue.clone();
///     thread::spawn(move || queue.iter().sum::<u32>())
/// };
/// for n in 1..=10 {
///     queue.put(n)?;
/// }
/// queue.close();
/// assert_eq!(consumer.join().unwrap(), 55);
/// assert_eq!(queue.take(), Err(QueueError::Closed));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct BoundedQueue<T> {
    monitor: Arc<Monitor<T>>,
}

impl<T> BoundedQueue<T> {
    /// Create an empty, open queue.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidCapacity` when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        Self::with_config(QueueConfig::with_capacity(capacity))
    }

    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        let capacity = config.validate()?;
        Ok(Self {
            monitor: Arc::new(Monitor::new(capacity, config.wake_policy, config.name)),
        })
    }

    /// Insert `item`, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// `Closed` if the queue is closed before a slot frees up. The item
    /// is handed back inside the error.
    pub fn put(&self, item: T) -> Result<(), PutError<T>> {
        self.monitor.put(item, WaitBudget::unbounded()).map(drop)
    }

    /// Insert `item`, waiting at most `timeout` for a free slot.
    ///
    /// A zero timeout never blocks. On `Timeout` nothing was inserted.
    pub fn try_put(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        self.monitor.put(item, WaitBudget::timeout(timeout)).map(drop)
    }

    /// Remove the oldest item, blocking while the queue is empty and open.
    ///
    /// Items put before `close()` are still handed out after it.
    ///
    /// # Errors
    ///
    /// `Closed` once the queue is closed and drained. No retry will succeed.
    pub fn take(&self) -> Result<T, QueueError> {
        self.monitor.take(WaitBudget::unbounded()).map(|(item, _)| item)
    }

    /// Remove the oldest item, waiting at most `timeout`.
    pub fn try_take(&self, timeout: Duration) -> Result<T, QueueError> {
        self.monitor
            .take(WaitBudget::timeout(timeout))
            .map(|(item, _)| item)
    }

    /// Close the queue and wake every blocked producer and consumer.
    ///
    /// Idempotent. Returns true only for the call that closed the queue.
    pub fn close(&self) -> bool {
        self.monitor.close().transitioned
    }

    pub fn is_closed(&self) -> bool {
        self.monitor.snapshot().closed
    }

    /// Stored items. Advisory: may be stale as soon as it returns.
    pub fn len(&self) -> usize {
        self.monitor.snapshot().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.monitor.snapshot().capacity
    }

    pub fn state(&self) -> QueueState {
        self.monitor.snapshot().state()
    }

    /// Threads currently parked waiting for a free slot.
    pub fn waiting_producers(&self) -> usize {
        self.monitor.snapshot().waiting_producers
    }

    /// Threads currently parked waiting for an item.
    pub fn waiting_consumers(&self) -> usize {
        self.monitor.snapshot().waiting_consumers
    }

    /// Items ever accepted.
    pub fn total_put(&self) -> u64 {
        self.monitor.snapshot().inserted
    }

    /// Items ever handed out.
    pub fn total_taken(&self) -> u64 {
        self.monitor.snapshot().removed
    }

    pub fn name(&self) -> Option<&str> {
        self.monitor.name()
    }

    /// Copy of the stored items, head to tail. Advisory, like `len`.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.monitor.contents()
    }

    /// Blocking iterator over items until the queue is closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { queue: self }
    }

    pub(crate) fn put_with_receipt(
        &self,
        item: T,
        timeout: Option<Duration>,
    ) -> Result<Receipt, PutError<T>> {
        let budget = timeout.map_or_else(WaitBudget::unbounded, WaitBudget::timeout);
        self.monitor.put(item, budget)
    }

    pub(crate) fn take_with_receipt(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(T, Receipt), QueueError> {
        let budget = timeout.map_or_else(WaitBudget::unbounded, WaitBudget::timeout);
        self.monitor.take(budget)
    }

    pub(crate) fn close_with_receipt(&self) -> CloseReceipt {
        self.monitor.close()
    }
}

impl<T: Send + 'static> BoundedQueue<T> {
    fn wake_handle(&self) -> Weak<dyn WakeAll> {
        let weak: Weak<Monitor<T>> = Arc::downgrade(&self.monitor);
        weak
    }

    /// `put` that gives up with `Cancelled` when `token` fires while waiting.
    pub fn put_cancellable(&self, item: T, token: &CancellationToken) -> Result<(), PutError<T>> {
        let _registration = token.register(self.wake_handle());
        self.monitor
            .put(item, WaitBudget::unbounded().cancellable(token))
            .map(drop)
    }

    /// `try_put` that also gives up with `Cancelled` when `token` fires.
    pub fn try_put_cancellable(
        &self,
        item: T,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<(), PutError<T>> {
        let _registration = token.register(self.wake_handle());
        self.monitor
            .put(item, WaitBudget::timeout(timeout).cancellable(token))
            .map(drop)
    }

    /// `take` that gives up with `Cancelled` when `token` fires while waiting.
    pub fn take_cancellable(&self, token: &CancellationToken) -> Result<T, QueueError> {
        let _registration = token.register(self.wake_handle());
        self.monitor
            .take(WaitBudget::unbounded().cancellable(token))
            .map(|(item, _)| item)
    }

    pub fn try_take_cancellable(
        &self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<T, QueueError> {
        let _registration = token.register(self.wake_handle());
        self.monitor
            .take(WaitBudget::timeout(timeout).cancellable(token))
            .map(|(item, _)| item)
    }
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            monitor: Arc::clone(&self.monitor),
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.monitor.snapshot();
        f.debug_struct("BoundedQueue")
            .field("name", &self.monitor.name())
            .field("len", &snapshot.len)
            .field("capacity", &snapshot.capacity)
            .field("closed", &snapshot.closed)
            .finish()
    }
}

/// Iterator returned by [`BoundedQueue::iter`].
pub struct Iter<'a, T> {
    queue: &'a BoundedQueue<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.take().ok()
    }
}

impl<'a, T> IntoIterator for &'a BoundedQueue<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}


#[cfg(loom)]
mod loom_tests {
    use loom::thread;

    use super::*;

    #[test]
    fn loom_handoff_through_full_queue() {
        loom::model(|| {
            let q = BoundedQueue::new(1).unwrap();
            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    q.put(1).unwrap();
                    q.put(2).unwrap();
                })
            };
            assert_eq!(q.take(), Ok(1));
            assert_eq!(q.take(), Ok(2));
            producer.join().unwrap();
        });
    }

    #[test]
    fn loom_close_wakes_consumer() {
        loom::model(|| {
            let q: BoundedQueue<u8> = BoundedQueue::new(1).unwrap();
            let consumer = {
                let q = q.clone();
                thread::spawn(move || q.take())
            };
            q.close();
            assert_eq!(consumer.join().unwrap(), Err(QueueError::Closed));
        });
    }

    #[test]
    fn loom_close_races_put() {
        loom::model(|| {
            let q = BoundedQueue::new(1).unwrap();
            let producer = {
                let q = q.clone();
                thread::spawn(move || q.put(7).is_ok())
            };
            q.close();
            let accepted = producer.join().unwrap();
            let drained = q.take().ok();
            assert_eq!(accepted, drained == Some(7));
            assert_eq!(q.take(), Err(QueueError::Closed));
        });
    }
}
