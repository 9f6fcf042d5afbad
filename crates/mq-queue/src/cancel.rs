//! External cancellation of blocking waits.
//!
//! A `CancellationToken` is shared by cloning. Waiting on a queue under a
//! token registers the queue's monitor with the token for the duration of
//! the call. `cancel()` first publishes the flag, then wakes every
//! registered monitor under that monitor's own lock, so a waiter either
//! sees the flag before parking or is parked when the broadcast arrives.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

/// Something holding parked threads that must re-check their predicates.
pub(crate) trait WakeAll: Send + Sync {
    fn wake_all(&self);
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    waiters: Mutex<Vec<(u64, Weak<dyn WakeAll>)>>,
}

/// Cooperative cancellation for `*_cancellable` queue operations.
///
/// Cancellation behaves like an expired timeout: a waiting operation
/// returns `Cancelled` with no effect on the queue, and an operation that
/// can complete without waiting still completes.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token and wake every thread waiting under it. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let targets: Vec<Weak<dyn WakeAll>> = self
            .inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, target)| Weak::clone(target))
            .collect();

        debug!(targets = targets.len(), "cancellation token fired");
        for target in targets.iter().filter_map(Weak::upgrade) {
            target.wake_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn register(&self, target: Weak<dyn WakeAll>) -> Registration<'_> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, target));
        Registration { token: self, id }
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes a monitor from the token when the waiting call returns.
pub(crate) struct Registration<'a> {
    token: &'a CancellationToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.token
            .inner
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl WakeAll for Counter {
        fn wake_all(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_cancel_wakes_registered_once() {
        let token = CancellationToken::new();
        let counter = Arc::new(Counter::default());
        let weak: Weak<Counter> = Arc::downgrade(&counter);
        let target: Weak<dyn WakeAll> = weak;
        let _registration = token.register(target);

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_removed_on_drop() {
        let token = CancellationToken::new();
        let counter = Arc::new(Counter::default());
        {
            let weak: Weak<Counter> = Arc::downgrade(&counter);
            let target: Weak<dyn WakeAll> = weak;
            let _registration = token.register(target);
            assert_eq!(token.registered(), 1);
        }
        assert_eq!(token.registered(), 0);
        token.cancel();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(format!("{:?}", token), "CancellationToken { cancelled: true }");
    }

    #[test]
    fn test_dropped_target_is_skipped() {
        let token = CancellationToken::new();
        let counter = Arc::new(Counter::default());
        let weak: Weak<Counter> = Arc::downgrade(&counter);
        let target: Weak<dyn WakeAll> = weak;
        let _registration = token.register(target);
        drop(counter);
        token.cancel();
        assert!(token.is_cancelled());
    }
}
