//! Bounded blocking queue invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostItems | Every accepted item is stored or was taken, exactly once |
//! | FifoOrder | Removal #k returns the item inserted as #k |
//! | BoundedCapacity | Stored items never exceed capacity |
//! | NoPutAfterClose | No insertion is accepted once close has run |
//! | DrainBeforeClosed | `take` reports `Closed` only after every accepted item was removed |
//!
//! Implementations number insertions and removals while holding their
//! lock, so the history can be appended to in any order and still be
//! checked against the queue's real linearization.

use std::collections::HashMap;

use crate::counterexample::{Counterexample, QueueIssue, StateSnapshot, ThreadAction};
use crate::property::{PropertyChecker, PropertyResult};

/// What a queue implementation exposes for property checking.
pub trait BoundedQueueProperties {
    /// Operation history. Owned so implementations can keep it behind a lock.
    fn history(&self) -> QueueHistory;

    /// Items currently stored, head to tail.
    fn current_contents(&self) -> Vec<u64>;

    /// Fixed capacity of the queue.
    fn capacity(&self) -> usize;
}

/// Recorded queue operations.
#[derive(Debug, Clone, Default)]
pub struct QueueHistory {
    pub operations: Vec<QueueOperation>,
}

/// A single recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOperation {
    pub thread_id: u64,
    pub op_type: QueueOpType,
    pub item: Option<u64>,
    /// Insertion ordinal for `Put`, removal ordinal for `Take`, items
    /// accepted so far for `Close`, items removed so far for `TakeClosed`.
    pub ordinal: Option<u64>,
    /// Stored items right after the operation, observed under the lock.
    pub len_after: Option<usize>,
    /// Position in the history, starting at 1.
    pub step: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOpType {
    /// Item accepted.
    Put,
    /// Item handed to a consumer.
    Take,
    /// `close()` ran (first or repeated call).
    Close,
    /// Put refused because the queue was closed.
    PutClosed,
    /// Take found the queue closed and empty.
    TakeClosed,
    /// Bounded wait expired or was cancelled with no effect on the queue.
    Abandoned,
}

impl QueueHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        thread_id: u64,
        op_type: QueueOpType,
        item: Option<u64>,
        ordinal: Option<u64>,
        len_after: Option<usize>,
    ) {
        let step = self.operations.len() as u64 + 1;
        self.operations.push(QueueOperation {
            thread_id,
            op_type,
            item,
            ordinal,
            len_after,
            step,
        });
    }

    pub fn record_put(&mut self, thread_id: u64, item: u64, ordinal: u64, len_after: usize) {
        self.push(thread_id, QueueOpType::Put, Some(item), Some(ordinal), Some(len_after));
    }

    pub fn record_take(&mut self, thread_id: u64, item: u64, ordinal: u64, len_after: usize) {
        self.push(thread_id, QueueOpType::Take, Some(item), Some(ordinal), Some(len_after));
    }

    /// `accepted` is the number of items the queue had accepted when it closed.
    pub fn record_close(&mut self, thread_id: u64, accepted: u64, len_after: usize) {
        self.push(thread_id, QueueOpType::Close, None, Some(accepted), Some(len_after));
    }

    pub fn record_put_closed(&mut self, thread_id: u64, item: u64) {
        self.push(thread_id, QueueOpType::PutClosed, Some(item), None, None);
    }

    /// `taken` is the number of items removed when `Closed` was observed.
    pub fn record_take_closed(&mut self, thread_id: u64, taken: u64) {
        self.push(thread_id, QueueOpType::TakeClosed, None, Some(taken), Some(0));
    }

    pub fn record_abandoned(&mut self, thread_id: u64, item: Option<u64>) {
        self.push(thread_id, QueueOpType::Abandoned, item, None, None);
    }

    pub fn of_type(&self, op_type: QueueOpType) -> impl Iterator<Item = &QueueOperation> + '_ {
        self.operations.iter().filter(move |op| op.op_type == op_type)
    }

    /// Items accepted at the first close, if the queue was closed.
    #[must_use]
    pub fn accepted_at_close(&self) -> Option<u64> {
        self.of_type(QueueOpType::Close)
            .filter_map(|op| op.ordinal)
            .min()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Property checker for bounded queue implementations.
pub struct BoundedQueuePropertyChecker<'a, Q: BoundedQueueProperties> {
    queue: &'a Q,
    dst_seed: Option<u64>,
}

impl<'a, Q: BoundedQueueProperties> BoundedQueuePropertyChecker<'a, Q> {
    #[must_use]
    pub fn new(queue: &'a Q) -> Self {
        Self {
            queue,
            dst_seed: None,
        }
    }

    /// Set DST seed for counterexample reproduction.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.dst_seed = Some(seed);
        self
    }

    fn counterexample(&self, history: &QueueHistory, issue: QueueIssue) -> Counterexample {
        let mut ce = match self.dst_seed {
            Some(seed) => Counterexample::with_seed(seed),
            None => Counterexample::new(),
        }
        .with_description(issue.to_string());

        for op in &history.operations {
            ce.add_action(ThreadAction {
                thread_id: op.thread_id,
                step: op.step,
                action: describe(op),
                success: matches!(
                    op.op_type,
                    QueueOpType::Put | QueueOpType::Take | QueueOpType::Close
                ),
            });
            if let Some(len) = op.len_after {
                ce.add_state(StateSnapshot {
                    step: op.step,
                    description: format!("len={}", len),
                    variables: vec![("len".to_string(), len.to_string())],
                });
            }
        }
        ce.add_issue(issue);
        ce
    }

    /// Multiset conservation: puts = takes + contents.
    fn check_no_lost_items(&self) -> PropertyResult {
        let history = self.queue.history();
        let mut balance: HashMap<u64, i64> = HashMap::new();

        for op in history.of_type(QueueOpType::Put) {
            if let Some(item) = op.item {
                *balance.entry(item).or_default() += 1;
            }
        }
        for op in history.of_type(QueueOpType::Take) {
            if let Some(item) = op.item {
                *balance.entry(item).or_default() -= 1;
            }
        }
        for item in self.queue.current_contents() {
            *balance.entry(item).or_default() -= 1;
        }

        let mut unbalanced: Vec<(u64, i64)> =
            balance.into_iter().filter(|(_, count)| *count != 0).collect();
        unbalanced.sort_unstable();

        match unbalanced.first() {
            None => PropertyResult::pass("NoLostItems"),
            Some(&(item, count)) => {
                let issue = if count > 0 {
                    QueueIssue::LostItem { item }
                } else {
                    QueueIssue::DuplicatedItem { item }
                };
                PropertyResult::fail(
                    "NoLostItems",
                    issue.to_string(),
                    Some(self.counterexample(&history, issue)),
                )
            }
        }
    }

    /// Removal #k must return insertion #k.
    fn check_fifo_order(&self) -> PropertyResult {
        let history = self.queue.history();
        let inserted: HashMap<u64, u64> = history
            .of_type(QueueOpType::Put)
            .filter_map(|op| Some((op.ordinal?, op.item?)))
            .collect();

        let mut removals: Vec<(u64, u64)> = history
            .of_type(QueueOpType::Take)
            .filter_map(|op| Some((op.ordinal?, op.item?)))
            .collect();
        removals.sort_unstable();

        for (ordinal, actual) in removals {
            match inserted.get(&ordinal) {
                Some(&expected) if expected == actual => {}
                Some(&expected) => {
                    let issue = QueueIssue::OutOfOrder {
                        ordinal,
                        expected,
                        actual,
                    };
                    return PropertyResult::fail(
                        "FifoOrder",
                        issue.to_string(),
                        Some(self.counterexample(&history, issue)),
                    );
                }
                None => {
                    return PropertyResult::fail(
                        "FifoOrder",
                        format!(
                            "Removal #{} returned {} but no insertion #{} was recorded",
                            ordinal, actual, ordinal
                        ),
                        None,
                    );
                }
            }
        }

        PropertyResult::pass("FifoOrder")
    }

    fn check_bounded_capacity(&self) -> PropertyResult {
        let history = self.queue.history();
        let capacity = self.queue.capacity();

        let over = history
            .operations
            .iter()
            .find_map(|op| op.len_after.filter(|len| *len > capacity).map(|len| (len, op.step)));
        if let Some((len, step)) = over {
            let issue = QueueIssue::CapacityExceeded {
                len,
                capacity,
                step,
            };
            return PropertyResult::fail(
                "BoundedCapacity",
                issue.to_string(),
                Some(self.counterexample(&history, issue)),
            );
        }

        let stored = self.queue.current_contents().len();
        if stored > capacity {
            return PropertyResult::fail(
                "BoundedCapacity",
                format!("Queue holds {} items but capacity is {}", stored, capacity),
                None,
            );
        }

        PropertyResult::pass("BoundedCapacity")
    }

    fn check_no_put_after_close(&self) -> PropertyResult {
        let history = self.queue.history();
        let Some(accepted_at_close) = history.accepted_at_close() else {
            return PropertyResult::pass("NoPutAfterClose");
        };

        let late = history
            .of_type(QueueOpType::Put)
            .find(|op| op.ordinal.is_some_and(|ordinal| ordinal >= accepted_at_close));
        if let Some(op) = late {
            let issue = QueueIssue::PutAfterClose {
                item: op.item.unwrap_or_default(),
                ordinal: op.ordinal.unwrap_or_default(),
                accepted_at_close,
            };
            return PropertyResult::fail(
                "NoPutAfterClose",
                issue.to_string(),
                Some(self.counterexample(&history, issue)),
            );
        }

        PropertyResult::pass("NoPutAfterClose")
    }

    fn check_drain_before_closed(&self) -> PropertyResult {
        let history = self.queue.history();
        let mut observed = history.of_type(QueueOpType::TakeClosed).peekable();
        if observed.peek().is_none() {
            return PropertyResult::pass("DrainBeforeClosed");
        }

        let Some(accepted) = history.accepted_at_close() else {
            return PropertyResult::fail(
                "DrainBeforeClosed",
                "take reported Closed but close was never called",
                None,
            );
        };

        for op in observed {
            let taken = op.ordinal.unwrap_or_default();
            if taken < accepted {
                let issue = QueueIssue::ClosedBeforeDrained { taken, accepted };
                return PropertyResult::fail(
                    "DrainBeforeClosed",
                    issue.to_string(),
                    Some(self.counterexample(&history, issue)),
                );
            }
        }

        PropertyResult::pass("DrainBeforeClosed")
    }
}

impl<Q: BoundedQueueProperties> PropertyChecker for BoundedQueuePropertyChecker<'_, Q> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_items(),
            self.check_fifo_order(),
            self.check_bounded_capacity(),
            self.check_no_put_after_close(),
            self.check_drain_before_closed(),
        ]
    }
}

fn describe(op: &QueueOperation) -> String {
    match (op.op_type, op.item) {
        (QueueOpType::Put, Some(item)) => format!("put({})", item),
        (QueueOpType::Take, Some(item)) => format!("take()={}", item),
        (QueueOpType::Close, _) => "close()".to_string(),
        (QueueOpType::PutClosed, Some(item)) => format!("put({})=Closed", item),
        (QueueOpType::TakeClosed, _) => "take()=Closed".to_string(),
        (QueueOpType::Abandoned, Some(item)) => format!("put({})=gave up", item),
        (QueueOpType::Abandoned, None) => "take()=gave up".to_string(),
        (op_type, _) => format!("{:?}", op_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorded {
        history: QueueHistory,
        contents: Vec<u64>,
        capacity: usize,
    }

    impl BoundedQueueProperties for Recorded {
        fn history(&self) -> QueueHistory {
            self.history.clone()
        }

        fn current_contents(&self) -> Vec<u64> {
            self.contents.clone()
        }

        fn capacity(&self) -> usize {
            self.capacity
        }
    }

    fn result(recorded: &Recorded, name: &str) -> PropertyResult {
        BoundedQueuePropertyChecker::new(recorded)
            .check_all()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap()
    }

    fn correct_run() -> Recorded {
        let mut history = QueueHistory::new();
        history.record_put(0, 10, 0, 1);
        history.record_put(0, 11, 1, 2);
        history.record_take(1, 10, 0, 1);
        history.record_close(0, 2, 1);
        history.record_put_closed(0, 12);
        history.record_take(1, 11, 1, 0);
        history.record_take_closed(1, 2);
        Recorded {
            history,
            contents: vec![],
            capacity: 2,
        }
    }

    #[test]
    fn test_correct_history_passes() {
        let recorded = correct_run();
        let checker = BoundedQueuePropertyChecker::new(&recorded);
        for r in checker.check_all() {
            assert!(r.holds, "{}", r);
        }
    }

    #[test]
    fn test_detects_lost_item() {
        let mut recorded = correct_run();
        recorded.history.operations.retain(|op| op.item != Some(11) || op.op_type != QueueOpType::Take);

        let no_lost = result(&recorded, "NoLostItems");
        assert!(!no_lost.holds);
        assert!(no_lost.violation.unwrap().contains("11"));
    }

    #[test]
    fn test_detects_duplicate() {
        let mut recorded = correct_run();
        recorded.contents = vec![10];
        assert!(!result(&recorded, "NoLostItems").holds);
    }

    #[test]
    fn test_detects_out_of_order() {
        let mut history = QueueHistory::new();
        history.record_put(0, 1, 0, 1);
        history.record_put(0, 2, 1, 2);
        history.record_take(1, 2, 0, 1);
        history.record_take(1, 1, 1, 0);
        let recorded = Recorded {
            history,
            contents: vec![],
            capacity: 2,
        };

        let fifo = result(&recorded, "FifoOrder");
        assert!(!fifo.holds);
        let diagram = fifo.counterexample.unwrap().render_diagram();
        assert!(diagram.contains("take()=2"));
    }

    #[test]
    fn test_detects_capacity_exceeded() {
        let mut history = QueueHistory::new();
        history.record_put(0, 1, 0, 1);
        history.record_put(0, 2, 1, 2);
        let recorded = Recorded {
            history,
            contents: vec![1, 2],
            capacity: 1,
        };
        assert!(!result(&recorded, "BoundedCapacity").holds);
    }

    #[test]
    fn test_detects_put_after_close() {
        let mut history = QueueHistory::new();
        history.record_close(0, 0, 0);
        history.record_put(1, 5, 0, 1);
        let recorded = Recorded {
            history,
            contents: vec![5],
            capacity: 1,
        };
        assert!(!result(&recorded, "NoPutAfterClose").holds);
    }

    #[test]
    fn test_detects_closed_before_drained() {
        let mut history = QueueHistory::new();
        history.record_put(0, 5, 0, 1);
        history.record_close(0, 1, 1);
        history.record_take_closed(1, 0);
        let recorded = Recorded {
            history,
            contents: vec![5],
            capacity: 1,
        };
        let drain = result(&recorded, "DrainBeforeClosed");
        assert!(!drain.holds);
        assert!(drain.violation.unwrap().contains("0 of 1"));
    }

    #[test]
    fn test_take_closed_without_close_fails() {
        let mut history = QueueHistory::new();
        history.record_take_closed(1, 0);
        let recorded = Recorded {
            history,
            contents: vec![],
            capacity: 1,
        };
        assert!(!result(&recorded, "DrainBeforeClosed").holds);
    }

    #[test]
    fn test_repeated_close_uses_first_count() {
        let mut history = QueueHistory::new();
        history.record_put(0, 1, 0, 1);
        history.record_close(0, 1, 1);
        history.record_close(1, 1, 1);
        assert_eq!(history.accepted_at_close(), Some(1));
        assert_eq!(history.len(), 3);
    }
}
