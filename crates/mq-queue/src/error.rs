//! Queue errors.

use std::fmt;

use thiserror::Error;

/// Why a queue operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum QueueError {
    /// Construction with a capacity below one.
    #[error("queue capacity must be at least 1, got {capacity}")]
    InvalidCapacity { capacity: usize },

    /// The queue is closed (and, for `take`, fully drained). Permanent.
    #[error("queue is closed")]
    Closed,

    /// A bounded wait expired before the operation could proceed.
    #[error("timed out waiting on queue")]
    Timeout,

    /// A cancellation token fired while the caller was waiting.
    #[error("wait on queue was cancelled")]
    Cancelled,
}

impl QueueError {
    /// `Timeout` and `Cancelled` may succeed on retry; the rest never will.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Timeout | QueueError::Cancelled)
    }
}

/// A refused `put`, handing the item back to the caller.
pub struct PutError<T> {
    kind: QueueError,
    item: T,
}

impl<T> PutError<T> {
    pub(crate) fn new(kind: QueueError, item: T) -> Self {
        Self { kind, item }
    }

    pub fn kind(&self) -> QueueError {
        self.kind
    }

    /// The item that was not inserted.
    pub fn into_inner(self) -> T {
        self.item
    }

    pub fn into_parts(self) -> (QueueError, T) {
        (self.kind, self.item)
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "put refused: {}", self.kind)
    }
}

impl<T> std::error::Error for PutError<T> {}

impl<T> PartialEq<QueueError> for PutError<T> {
    fn eq(&self, other: &QueueError) -> bool {
        self.kind == *other
    }
}

impl<T> From<PutError<T>> for QueueError {
    fn from(err: PutError<T>) -> Self {
        err.kind
    }
}
