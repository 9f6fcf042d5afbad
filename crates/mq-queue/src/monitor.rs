//! The monitor: one mutex guarding storage and lifecycle, plus the
//! `not_full` and `not_empty` condition variables.
//!
//! Every wait re-checks its predicate in a loop, and the predicate is
//! checked before the deadline or cancellation. A woken waiter therefore
//! always uses the slot or item it was woken for instead of discarding
//! the signal, which keeps single-wake signalling free of lost wakeups.

use std::num::NonZeroUsize;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cancel::{CancellationToken, WakeAll};
use crate::config::WakePolicy;
use crate::error::{PutError, QueueError};
use crate::lifecycle::{Lifecycle, QueueState};
use crate::storage::SlotStorage;
use crate::sync::{Condvar, Mutex, MutexGuard};

/// Everything the monitor's mutex protects.
struct Slots<T> {
    storage: SlotStorage<T>,
    lifecycle: Lifecycle,
    waiting_producers: usize,
    waiting_consumers: usize,
}

/// Ordinal and resulting length of a completed put or take, observed
/// under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Receipt {
    pub(crate) ordinal: u64,
    pub(crate) len_after: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CloseReceipt {
    pub(crate) transitioned: bool,
    /// Items accepted when the queue first closed.
    pub(crate) accepted: u64,
    pub(crate) remaining: usize,
}

/// Consistent view of the monitor state, taken under one lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub(crate) len: usize,
    pub(crate) capacity: usize,
    pub(crate) closed: bool,
    pub(crate) waiting_producers: usize,
    pub(crate) waiting_consumers: usize,
    pub(crate) inserted: u64,
    pub(crate) removed: u64,
}

impl Snapshot {
    pub(crate) fn state(&self) -> QueueState {
        QueueState::from_parts(self.len, self.capacity, self.closed)
    }
}

/// How long a call may wait, and what may cut the wait short.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WaitBudget<'a> {
    deadline: Option<Instant>,
    token: Option<&'a CancellationToken>,
}

impl<'a> WaitBudget<'a> {
    pub(crate) fn unbounded() -> Self {
        Self::default()
    }

    /// A timeout too large to represent as an `Instant` waits forever.
    pub(crate) fn timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            token: None,
        }
    }

    pub(crate) fn cancellable(self, token: &'a CancellationToken) -> Self {
        Self {
            token: Some(token),
            ..self
        }
    }

    fn exhausted(&self) -> Option<QueueError> {
        if self.token.is_some_and(CancellationToken::is_cancelled) {
            return Some(QueueError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(QueueError::Timeout),
            _ => None,
        }
    }
}

pub(crate) struct Monitor<T> {
    slots: Mutex<Slots<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    wake_policy: WakePolicy,
    name: Option<String>,
}

impl<T> Monitor<T> {
    pub(crate) fn new(capacity: NonZeroUsize, wake_policy: WakePolicy, name: Option<String>) -> Self {
        Self {
            slots: Mutex::new(Slots {
                storage: SlotStorage::with_capacity(capacity),
                lifecycle: Lifecycle::default(),
                waiting_producers: 0,
                waiting_consumers: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            wake_policy,
            name,
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Nothing runs user code under this lock, so a poisoned guard still
    /// protects consistent state.
    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park<'g>(
        &self,
        condvar: &Condvar,
        slots: MutexGuard<'g, Slots<T>>,
        deadline: Option<Instant>,
    ) -> MutexGuard<'g, Slots<T>> {
        match deadline {
            None => condvar.wait(slots).unwrap_or_else(PoisonError::into_inner),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                condvar
                    .wait_timeout(slots, remaining)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        }
    }

    fn signal(&self, condvar: &Condvar) {
        match self.wake_policy {
            WakePolicy::Single => condvar.notify_one(),
            WakePolicy::Broadcast => condvar.notify_all(),
        }
    }

    pub(crate) fn put(&self, item: T, budget: WaitBudget<'_>) -> Result<Receipt, PutError<T>> {
        let mut item = item;
        let mut slots = self.lock();

        let ordinal = loop {
            if slots.lifecycle.is_closed() {
                trace!(queue = self.label(), "put refused: closed");
                return Err(PutError::new(QueueError::Closed, item));
            }
            match slots.storage.push_back(item) {
                Ok(ordinal) => break ordinal,
                Err(rejected) => item = rejected,
            }
            if let Some(err) = budget.exhausted() {
                debug!(queue = self.label(), error = %err, "put gave up waiting for a slot");
                return Err(PutError::new(err, item));
            }

            slots.waiting_producers += 1;
            trace!(queue = self.label(), waiting = slots.waiting_producers, "producer parked");
            slots = self.park(&self.not_full, slots, budget.deadline);
            slots.waiting_producers -= 1;
        };

        let len_after = slots.storage.len();
        if slots.waiting_consumers > 0 {
            self.signal(&self.not_empty);
        }
        Ok(Receipt { ordinal, len_after })
    }

    pub(crate) fn take(&self, budget: WaitBudget<'_>) -> Result<(T, Receipt), QueueError> {
        let mut slots = self.lock();

        loop {
            if let Some((item, ordinal)) = slots.storage.pop_front() {
                let len_after = slots.storage.len();
                if slots.waiting_producers > 0 {
                    self.signal(&self.not_full);
                }
                return Ok((item, Receipt { ordinal, len_after }));
            }
            if slots.lifecycle.is_closed() {
                trace!(queue = self.label(), "take found queue closed and drained");
                return Err(QueueError::Closed);
            }
            if let Some(err) = budget.exhausted() {
                debug!(queue = self.label(), error = %err, "take gave up waiting for an item");
                return Err(err);
            }

            slots.waiting_consumers += 1;
            trace!(queue = self.label(), waiting = slots.waiting_consumers, "consumer parked");
            slots = self.park(&self.not_empty, slots, budget.deadline);
            slots.waiting_consumers -= 1;
        }
    }

    /// Close and wake every waiter on both conditions. Only the first
    /// call changes anything.
    pub(crate) fn close(&self) -> CloseReceipt {
        let mut slots = self.lock();
        let inserted = slots.storage.inserted();
        let transitioned = slots.lifecycle.close(inserted);
        let remaining = slots.storage.len();

        if transitioned {
            debug!(
                queue = self.label(),
                remaining,
                waiting_producers = slots.waiting_producers,
                waiting_consumers = slots.waiting_consumers,
                "queue closed"
            );
            self.not_full.notify_all();
            self.not_empty.notify_all();
        }

        CloseReceipt {
            transitioned,
            accepted: slots.lifecycle.accepted_at_close().unwrap_or(inserted),
            remaining,
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let slots = self.lock();
        Snapshot {
            len: slots.storage.len(),
            capacity: slots.storage.capacity(),
            closed: slots.lifecycle.is_closed(),
            waiting_producers: slots.waiting_producers,
            waiting_consumers: slots.waiting_consumers,
            inserted: slots.storage.inserted(),
            removed: slots.storage.removed(),
        }
    }

    pub(crate) fn contents(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.lock().storage.iter().cloned().collect()
    }
}

impl<T: Send> WakeAll for Monitor<T> {
    fn wake_all(&self) {
        let _slots = self.lock();
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    fn monitor(capacity: usize) -> Monitor<u32> {
        Monitor::new(NonZeroUsize::new(capacity).unwrap(), WakePolicy::Single, None)
    }

    #[test]
    fn test_receipts_carry_ordinals() {
        let m = monitor(2);
        assert_eq!(
            m.put(7, WaitBudget::unbounded()).unwrap(),
            Receipt { ordinal: 0, len_after: 1 }
        );
        assert_eq!(
            m.put(8, WaitBudget::unbounded()).unwrap(),
            Receipt { ordinal: 1, len_after: 2 }
        );
        let (item, receipt) = m.take(WaitBudget::unbounded()).unwrap();
        assert_eq!((item, receipt), (7, Receipt { ordinal: 0, len_after: 1 }));
    }

    #[test]
    fn test_zero_budget_never_parks() {
        let m = monitor(1);
        assert_eq!(m.take(WaitBudget::timeout(Duration::ZERO)).unwrap_err(), QueueError::Timeout);
        m.put(1, WaitBudget::unbounded()).unwrap();
        let err = m.put(2, WaitBudget::timeout(Duration::ZERO)).unwrap_err();
        assert_eq!(err.into_parts(), (QueueError::Timeout, 2));
        assert_eq!(m.snapshot().waiting_producers, 0);
    }

    #[test]
    fn test_cancelled_token_does_not_block_ready_operation() {
        let m = monitor(1);
        let token = CancellationToken::new();
        token.cancel();
        let budget = WaitBudget::unbounded().cancellable(&token);
        assert!(m.put(1, budget).is_ok());
        assert_eq!(m.put(2, budget).unwrap_err().kind(), QueueError::Cancelled);
        assert_eq!(m.take(budget).unwrap().0, 1);
        assert_eq!(m.take(budget).unwrap_err(), QueueError::Cancelled);
    }

    #[test]
    fn test_close_receipt() {
        let m = monitor(2);
        m.put(1, WaitBudget::unbounded()).unwrap();
        let first = m.close();
        assert!(first.transitioned);
        assert_eq!((first.accepted, first.remaining), (1, 1));

        m.take(WaitBudget::unbounded()).unwrap();
        let second = m.close();
        assert!(!second.transitioned);
        assert_eq!((second.accepted, second.remaining), (1, 0));
        assert_eq!(m.snapshot().state(), QueueState::ClosedDone);
    }

    #[test]
    fn test_huge_timeout_is_unbounded() {
        let budget = WaitBudget::timeout(Duration::MAX);
        assert!(budget.deadline.is_none());
        assert!(budget.exhausted().is_none());
    }
}
