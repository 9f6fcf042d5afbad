//! Open/closed lifecycle.
//!
//! ```text
//!   OpenEmpty <-> OpenPartial <-> OpenFull
//!       |              |              |
//!     close          close          close
//!       v              v              v
//!   ClosedDone <--take-- ClosedDraining
//! ```
//!
//! `closed` only ever goes from false to true, and `ClosedDone` is terminal.

use serde::Serialize;

/// Observable state of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueueState {
    OpenEmpty,
    /// Open, holding at least one item with at least one free slot.
    OpenPartial,
    OpenFull,
    /// Closed with items left for consumers.
    ClosedDraining,
    /// Closed and empty. Every `put` and `take` fails with `Closed`.
    ClosedDone,
}

impl QueueState {
    #[must_use]
    pub fn from_parts(len: usize, capacity: usize, closed: bool) -> Self {
        debug_assert!(len <= capacity, "len {} exceeds capacity {}", len, capacity);
        match (closed, len) {
            (true, 0) => QueueState::ClosedDone,
            (true, _) => QueueState::ClosedDraining,
            (false, 0) => QueueState::OpenEmpty,
            (false, n) if n >= capacity => QueueState::OpenFull,
            (false, _) => QueueState::OpenPartial,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, QueueState::ClosedDraining | QueueState::ClosedDone)
    }

    pub fn is_terminal(&self) -> bool {
        *self == QueueState::ClosedDone
    }
}

/// The closed flag plus what the queue had accepted when it closed.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    accepted_at_close: Option<u64>,
}

impl Lifecycle {
    pub(crate) fn is_closed(&self) -> bool {
        self.accepted_at_close.is_some()
    }

    pub(crate) fn accepted_at_close(&self) -> Option<u64> {
        self.accepted_at_close
    }

    /// Returns true only for the call that performs the transition.
    pub(crate) fn close(&mut self, accepted: u64) -> bool {
        if self.is_closed() {
            return false;
        }
        self.accepted_at_close = Some(accepted);
        true
    }
}
