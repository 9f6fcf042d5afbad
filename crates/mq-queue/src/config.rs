//! Queue configuration.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// How ordinary `put`/`take` completions wake waiters on the opposite
/// condition. `close()` always wakes everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakePolicy {
    /// `notify_one`: one slot or item frees one waiter.
    #[default]
    Single,
    /// `notify_all`: every waiter re-checks its predicate.
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub wake_policy: WakePolicy,
    /// Appears in every tracing event emitted by the queue.
    pub name: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            wake_policy: WakePolicy::Single,
            name: None,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn wake_policy(mut self, policy: WakePolicy) -> Self {
        self.wake_policy = policy;
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<NonZeroUsize, QueueError> {
        NonZeroUsize::new(self.capacity).ok_or(QueueError::InvalidCapacity {
            capacity: self.capacity,
        })
    }
}
