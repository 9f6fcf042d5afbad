//! Counterexample representation and rendering.
//!
//! When a queue property is violated, a counterexample shows the
//! operations that led there, one column per thread.

use std::fmt;

/// The failure path behind a violated property.
///
/// Holds state snapshots and per-thread actions. `render_diagram` lays
/// them out as a step-by-thread table.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Sequence of state snapshots
    pub states: Vec<StateSnapshot>,
    /// Thread interleaving that caused the failure
    pub interleaving: Vec<ThreadAction>,
    /// Queue-level issues detected
    pub issues: Vec<QueueIssue>,
    /// DST seed for reproduction (if applicable)
    pub dst_seed: Option<u64>,
    /// Human-readable summary of the failure
    pub description: Option<String>,
}

/// Snapshot of queue state at a step.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub step: u64,
    pub description: String,
    pub variables: Vec<(String, String)>,
}

/// One operation attempted by one thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    pub thread_id: u64,
    pub step: u64,
    pub action: String,
    pub success: bool,
}

/// A specific misbehaviour of a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueIssue {
    /// More items stored than the queue's capacity allows.
    CapacityExceeded { len: usize, capacity: usize, step: u64 },
    /// An accepted item is neither stored nor taken.
    LostItem { item: u64 },
    /// An item was taken more times than it was put.
    DuplicatedItem { item: u64 },
    /// Removal ordinal handed out an item other than the one inserted
    /// at the same ordinal.
    OutOfOrder { ordinal: u64, expected: u64, actual: u64 },
    /// An item was accepted after the queue closed.
    PutAfterClose { item: u64, ordinal: u64, accepted_at_close: u64 },
    /// A consumer saw `Closed` while accepted items were still queued.
    ClosedBeforeDrained { taken: u64, accepted: u64 },
}

impl Counterexample {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counterexample carrying the DST seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in order"
        );
        self.states.push(state);
    }

    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    pub fn add_issue(&mut self, issue: QueueIssue) {
        self.issues.push(issue);
    }

    /// Render as a thread diagram.
    ///
    /// ```text
    /// DST_SEED=12345
    ///
    /// Step | Thread 0 | Thread 1 | State
    /// -----|----------|----------|------
    ///    1 | put(1)   |          | len=1
    ///    2 |          | take()=1 | len=0
    ///    3 | close()  |          | closed
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut output = String::new();

        if let Some(seed) = self.dst_seed {
            output.push_str(&format!("DST_SEED={}\n\n", seed));
        }
        if let Some(desc) = &self.description {
            output.push_str(&format!("Failure: {}\n\n", desc));
        }

        let mut threads: Vec<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        threads.sort_unstable();
        threads.dedup();

        if threads.is_empty() {
            output.push_str("(no thread actions recorded)\n");
        } else {
            output.push_str("Step |");
            for tid in &threads {
                output.push_str(&format!(" Thread {} |", tid));
            }
            output.push_str(" State\n-----|");
            for _ in &threads {
                output.push_str("----------|");
            }
            output.push_str("------\n");

            let max_step = self.interleaving.iter().map(|a| a.step).max().unwrap_or(0);
            for step in 1..=max_step {
                output.push_str(&format!("{:4} |", step));
                for tid in &threads {
                    match self
                        .interleaving
                        .iter()
                        .find(|a| a.step == step && a.thread_id == *tid)
                    {
                        Some(a) if a.success => output.push_str(&format!(" {} |", a.action)),
                        Some(a) => output.push_str(&format!(" {} [FAIL] |", a.action)),
                        None => output.push_str("          |"),
                    }
                }
                if let Some(state) = self.states.iter().find(|s| s.step == step) {
                    output.push_str(&format!(" {}", state.description));
                }
                output.push('\n');
            }
        }

        if !self.issues.is_empty() {
            output.push_str("\nQueue Issues:\n");
            for issue in &self.issues {
                output.push_str(&format!("  - {}\n", issue));
            }
        }

        output
    }
}

impl fmt::Display for QueueIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueIssue::CapacityExceeded { len, capacity, step } => write!(
                f,
                "Capacity exceeded: {} items stored with capacity {} at step {}",
                len, capacity, step
            ),
            QueueIssue::LostItem { item } => {
                write!(f, "Lost item: {} accepted but neither stored nor taken", item)
            }
            QueueIssue::DuplicatedItem { item } => {
                write!(f, "Duplicated item: {} taken more often than put", item)
            }
            QueueIssue::OutOfOrder {
                ordinal,
                expected,
                actual,
            } => write!(
                f,
                "Out of order: removal #{} returned {} but insertion #{} was {}",
                ordinal, actual, ordinal, expected
            ),
            QueueIssue::PutAfterClose {
                item,
                ordinal,
                accepted_at_close,
            } => write!(
                f,
                "Put after close: {} accepted as #{} but close froze the count at {}",
                item, ordinal, accepted_at_close
            ),
            QueueIssue::ClosedBeforeDrained { taken, accepted } => write!(
                f,
                "Closed before drained: consumer saw Closed after {} of {} items",
                taken, accepted
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterexample_with_seed() {
        let ce = Counterexample::with_seed(12345);
        assert_eq!(ce.dst_seed, Some(12345));
        assert!(ce.states.is_empty());
    }

    #[test]
    fn test_render_diagram() {
        let mut ce = Counterexample::with_seed(42).with_description("FIFO broken");
        ce.add_action(ThreadAction {
            thread_id: 0,
            step: 1,
            action: "put(1)".to_string(),
            success: true,
        });
        ce.add_action(ThreadAction {
            thread_id: 1,
            step: 2,
            action: "take()".to_string(),
            success: false,
        });
        ce.add_state(StateSnapshot {
            step: 1,
            description: "len=1".to_string(),
            variables: vec![],
        });
        ce.add_issue(QueueIssue::LostItem { item: 7 });

        let diagram = ce.render_diagram();
        assert!(diagram.contains("DST_SEED=42"));
        assert!(diagram.contains("Failure: FIFO broken"));
        assert!(diagram.contains("Thread 1"));
        assert!(diagram.contains("put(1)"));
        assert!(diagram.contains("take() [FAIL]"));
        assert!(diagram.contains("len=1"));
        assert!(diagram.contains("Lost item: 7"));
    }

    #[test]
    fn test_render_without_actions() {
        let diagram = Counterexample::new().render_diagram();
        assert!(diagram.contains("no thread actions recorded"));
    }
}
