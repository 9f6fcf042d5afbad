//! Oracle extraction from stateright model checking.
//!
//! Oracles are interleavings worth replaying against the real queue in
//! DST. Each step carries the outcome the model predicts, so a replay can
//! check the implementation step by step rather than only at the end.
//!
//! # Scenarios Captured
//!
//! 1. **Handoff** - producer blocks on a full queue, a take frees a slot
//! 2. **Close wakes consumer** - consumer parked on empty sees `Closed`
//! 3. **Drain after close** - items accepted before close still leave
//! 4. Paths the checker discovers for each reachability property

use std::collections::BTreeMap;

use serde::Serialize;
use stateright::{Checker, Model};

use crate::queue_model::{
    QueueAction, QueueModel, Role, StepOutcome, CLOSE_WHILE_CONSUMER_WAITS, CONSUMER_BLOCKED_ON_EMPTY,
    DRAINED_AFTER_CLOSE, NO_STRANDED_WAITER, PRODUCER_BLOCKED_ON_FULL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OracleCategory {
    Handoff,
    BlockedProducer,
    BlockedConsumer,
    CloseWakesWaiter,
    DrainAfterClose,
    /// A path that breaks a property; only extracted from buggy models
    Violation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OracleActionType {
    Put,
    Take,
    Close,
}

/// Mirrors the DST outcome type without depending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExpectedOutcome {
    Accepted,
    Blocked,
    Refused,
    Took(u64),
    Drained,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleAction {
    pub thread: u64,
    pub action_type: OracleActionType,
    /// Item for puts
    pub value: Option<u64>,
    pub expected: ExpectedOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Oracle {
    pub name: String,
    pub capacity: usize,
    pub actions: Vec<OracleAction>,
    pub description: String,
    pub category: OracleCategory,
}

impl Oracle {
    pub fn new(name: impl Into<String>, capacity: usize, category: OracleCategory) -> Self {
        Self {
            name: name.into(),
            capacity,
            actions: Vec::new(),
            description: String::new(),
            category,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn add_action(
        &mut self,
        thread: u64,
        action_type: OracleActionType,
        value: Option<u64>,
        expected: ExpectedOutcome,
    ) {
        self.actions.push(OracleAction {
            thread,
            action_type,
            value,
            expected,
        });
    }

    fn put(&mut self, thread: u64, item: u64, expected: ExpectedOutcome) {
        self.add_action(thread, OracleActionType::Put, Some(item), expected);
    }

    fn take(&mut self, thread: u64, expected: ExpectedOutcome) {
        self.add_action(thread, OracleActionType::Take, None, expected);
    }

    fn close(&mut self, thread: u64) {
        self.add_action(thread, OracleActionType::Close, None, ExpectedOutcome::Closed);
    }

    /// Steps where the acting thread parks.
    pub fn blocked_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.expected == ExpectedOutcome::Blocked)
            .count()
    }

    /// capacity 2: `put(1)`, `put(2)` succeed, `put(3)` blocks until a
    /// take returns 1, then the remaining takes yield 2 and 3.
    pub fn handoff_through_full() -> Self {
        let mut oracle = Self::new("handoff_through_full", 2, OracleCategory::Handoff)
            .with_description("T0 blocks on put(3) until T1 takes 1; T1 then takes 2 and 3");
        oracle.put(0, 1, ExpectedOutcome::Accepted);
        oracle.put(0, 2, ExpectedOutcome::Accepted);
        oracle.put(0, 3, ExpectedOutcome::Blocked);
        oracle.take(1, ExpectedOutcome::Took(1));
        oracle.put(0, 3, ExpectedOutcome::Accepted);
        oracle.take(1, ExpectedOutcome::Took(2));
        oracle.take(1, ExpectedOutcome::Took(3));
        oracle
    }

    /// capacity 1, never filled: a parked take returns `Closed`.
    pub fn close_wakes_empty_consumer() -> Self {
        let mut oracle = Self::new("close_wakes_empty_consumer", 1, OracleCategory::CloseWakesWaiter)
            .with_description("T1 parks on an empty queue; T2 closes; T1 observes Closed");
        oracle.take(1, ExpectedOutcome::Blocked);
        oracle.close(2);
        oracle.take(1, ExpectedOutcome::Drained);
        oracle
    }

    /// capacity 1 holding one item when closed: one take succeeds, the
    /// next returns `Closed`.
    pub fn drain_single_item() -> Self {
        let mut oracle = Self::new("drain_single_item", 1, OracleCategory::DrainAfterClose)
            .with_description("close with one item queued; the item is still delivered");
        oracle.put(0, 7, ExpectedOutcome::Accepted);
        oracle.close(2);
        oracle.put(0, 8, ExpectedOutcome::Refused);
        oracle.take(1, ExpectedOutcome::Took(7));
        oracle.take(1, ExpectedOutcome::Drained);
        oracle
    }

    pub fn prebuilt() -> Vec<Self> {
        vec![
            Self::handoff_through_full(),
            Self::close_wakes_empty_consumer(),
            Self::drain_single_item(),
        ]
    }

    pub fn format_trace(&self) -> String {
        let mut output = format!("Oracle: {} [{:?}] capacity={}\n", self.name, self.category, self.capacity);
        output.push_str(&format!("Description: {}\n", self.description));
        output.push_str("Trace:\n");
        for (i, action) in self.actions.iter().enumerate() {
            let call = match (action.action_type, action.value) {
                (OracleActionType::Put, Some(item)) => format!("put({})", item),
                (OracleActionType::Put, None) => "put(?)".to_string(),
                (OracleActionType::Take, _) => "take()".to_string(),
                (OracleActionType::Close, _) => "close()".to_string(),
            };
            output.push_str(&format!("  {:3}. T{}: {} -> {:?}\n", i + 1, action.thread, call, action.expected));
        }
        output
    }
}

/// Reachability properties worth a replayable path, with their category.
const DISCOVERIES: [(&str, OracleCategory); 5] = [
    (PRODUCER_BLOCKED_ON_FULL, OracleCategory::BlockedProducer),
    (CONSUMER_BLOCKED_ON_EMPTY, OracleCategory::BlockedConsumer),
    (CLOSE_WHILE_CONSUMER_WAITS, OracleCategory::CloseWakesWaiter),
    (DRAINED_AFTER_CLOSE, OracleCategory::DrainAfterClose),
    (NO_STRANDED_WAITER, OracleCategory::Violation),
];

pub struct OracleExtractor {
    oracles: Vec<Oracle>,
    oracles_per_category_max: usize,
    category_counts: BTreeMap<OracleCategory, usize>,
}

impl Default for OracleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl OracleExtractor {
    pub fn new() -> Self {
        Self {
            oracles: Vec::new(),
            oracles_per_category_max: 10,
            category_counts: BTreeMap::new(),
        }
    }

    pub fn with_max_per_category(mut self, max: usize) -> Self {
        self.oracles_per_category_max = max;
        self
    }

    /// Model-check `model`, then collect the prebuilt scenarios and one
    /// path per discovered property.
    pub fn extract(&mut self, model: QueueModel) -> Vec<Oracle> {
        let replay = model.clone();
        let checker = model.checker().spawn_bfs().join();

        for oracle in Oracle::prebuilt() {
            self.push(oracle);
        }
        for (name, category) in DISCOVERIES {
            if let Some(path) = checker.discovery(name) {
                let oracle = oracle_from_actions(&replay, &name.replace(' ', "_"), category, &path.into_actions());
                self.push(oracle.with_description(format!("path to '{}' found by the model checker", name)));
            }
        }
        self.oracles.clone()
    }

    fn push(&mut self, oracle: Oracle) {
        let count = self.category_counts.entry(oracle.category).or_insert(0);
        if *count < self.oracles_per_category_max {
            *count += 1;
            self.oracles.push(oracle);
        }
    }

    pub fn by_category(&self, category: OracleCategory) -> Vec<&Oracle> {
        self.oracles.iter().filter(|o| o.category == category).collect()
    }

    pub fn category_counts(&self) -> &BTreeMap<OracleCategory, usize> {
        &self.category_counts
    }
}

/// Replay `actions` from the model's initial state and annotate each
/// operation with the outcome the model predicts. Spurious wakeups are not
/// operations and are left out; the woken thread's next step is its
/// re-check.
pub fn oracle_from_actions(model: &QueueModel, name: &str, category: OracleCategory, actions: &[QueueAction]) -> Oracle {
    let mut oracle = Oracle::new(name, model.capacity, category);
    let mut state = model.initial_state();

    for action in actions {
        let Some(outcome) = model.outcome(&state, action) else {
            break;
        };
        let thread = action.thread() as u64;
        match (action, outcome) {
            (QueueAction::Put { .. }, outcome) => {
                let item = match (model.roles()[action.thread()], outcome) {
                    (_, StepOutcome::Accepted(item)) => Some(item),
                    (Role::Producer(p), _) => model.producers[p].get(state.next_item[action.thread()]).copied(),
                    _ => None,
                };
                let expected = match outcome {
                    StepOutcome::Accepted(_) => ExpectedOutcome::Accepted,
                    StepOutcome::Refused => ExpectedOutcome::Refused,
                    _ => ExpectedOutcome::Blocked,
                };
                oracle.add_action(thread, OracleActionType::Put, item, expected);
            }
            (QueueAction::Take { .. }, StepOutcome::Took(item)) => oracle.take(thread, ExpectedOutcome::Took(item)),
            (QueueAction::Take { .. }, StepOutcome::Drained) => oracle.take(thread, ExpectedOutcome::Drained),
            (QueueAction::Take { .. }, _) => oracle.take(thread, ExpectedOutcome::Blocked),
            (QueueAction::Close { .. }, _) => oracle.close(thread),
            (QueueAction::SpuriousWake { .. }, _) => {}
        }
        match model.next_state(&state, *action) {
            Some(next) => state = next,
            None => break,
        }
    }
    oracle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_model::CloseWake;

    fn model() -> QueueModel {
        QueueModel::new(1, vec![vec![1, 2], vec![3]], 2)
    }

    #[test]
    fn test_prebuilt_oracles() {
        let oracles = Oracle::prebuilt();
        assert_eq!(oracles.len(), 3);
        assert_eq!(oracles[0].blocked_count(), 1);
        assert_eq!(oracles[1].actions[2].expected, ExpectedOutcome::Drained);
        assert!(oracles[2].format_trace().contains("T1: take() -> Took(7)"));
    }

    #[test]
    fn test_extract_includes_discoveries() {
        let mut extractor = OracleExtractor::new();
        let oracles = extractor.extract(model());

        assert!(oracles.len() >= 3 + 4, "only {} oracles", oracles.len());
        assert!(!extractor.by_category(OracleCategory::BlockedProducer).is_empty());
        assert!(!extractor.by_category(OracleCategory::BlockedConsumer).is_empty());
        assert!(extractor.by_category(OracleCategory::Violation).is_empty());
        for oracle in extractor.by_category(OracleCategory::BlockedProducer) {
            assert!(oracle.blocked_count() > 0, "{}", oracle.format_trace());
        }
    }

    #[test]
    fn test_buggy_model_yields_violation_oracle() {
        let mut extractor = OracleExtractor::new();
        extractor.extract(model().with_close_wake(CloseWake::None));
        let violations = extractor.by_category(OracleCategory::Violation);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].actions.iter().any(|a| a.action_type == OracleActionType::Close));
    }

    #[test]
    fn test_category_limit() {
        let mut extractor = OracleExtractor::new().with_max_per_category(0);
        assert!(extractor.extract(model()).is_empty());
        assert!(extractor.category_counts().values().all(|&c| c == 0));
    }

    #[test]
    fn test_oracle_from_actions_annotates_outcomes() {
        let model = QueueModel::new(1, vec![vec![5, 6]], 1);
        let actions = [
            QueueAction::Put { thread: 0, wake: None },
            QueueAction::Put { thread: 0, wake: None },
            QueueAction::Take { thread: 1, wake: Some(0) },
            QueueAction::Put { thread: 0, wake: None },
            QueueAction::Close { thread: 2 },
        ];
        let oracle = oracle_from_actions(&model, "manual", OracleCategory::Handoff, &actions);
        let expected: Vec<_> = oracle.actions.iter().map(|a| a.expected).collect();
        assert_eq!(
            expected,
            vec![
                ExpectedOutcome::Accepted,
                ExpectedOutcome::Blocked,
                ExpectedOutcome::Took(5),
                ExpectedOutcome::Accepted,
                ExpectedOutcome::Closed,
            ]
        );
        assert_eq!(oracle.actions[1].value, Some(6));
    }
}
