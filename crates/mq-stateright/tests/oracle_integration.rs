//! Integration test: stateright -> oracles -> DST.
//!
//! 1. Model-check the monitor and extract oracles
//! 2. Convert each oracle into a DST trace
//! 3. Replay it against the real queue, step by step

use mq_core::{BoundedQueuePropertyChecker, PropertyChecker};
use mq_dst::{replay_oracle, OracleAction as DstAction, OracleScheduler, OracleTrace, Outcome};
use mq_queue::{BoundedQueue, QueueConfig, TrackedQueue, WakePolicy};
use mq_stateright::{
    verify_implementation, CloseWake, ExpectedOutcome, Oracle, OracleActionType, OracleCategory, OracleExtractor,
    QueueModel, VerifierConfig, WakeMode,
};

fn to_dst_trace(oracle: &Oracle) -> OracleTrace {
    let mut trace = OracleTrace::new(oracle.name.clone(), oracle.capacity).with_description(oracle.description.clone());
    for action in &oracle.actions {
        let dst_action = match (action.action_type, action.value) {
            (OracleActionType::Put, Some(item)) => DstAction::Put(item),
            (OracleActionType::Put, None) => panic!("put without an item in {}", oracle.name),
            (OracleActionType::Take, _) => DstAction::Take,
            (OracleActionType::Close, _) => DstAction::Close,
        };
        let expected = match action.expected {
            ExpectedOutcome::Accepted => Outcome::Accepted,
            ExpectedOutcome::Blocked => Outcome::Blocked,
            ExpectedOutcome::Refused => Outcome::Refused,
            ExpectedOutcome::Took(item) => Outcome::Took(item),
            ExpectedOutcome::Drained => Outcome::Drained,
            ExpectedOutcome::Closed => Outcome::Closed { transitioned: true },
        };
        trace.add_step(action.thread as usize, dst_action, Some(expected));
    }
    trace
}

fn extracted(model: QueueModel) -> (OracleExtractor, Vec<Oracle>) {
    let mut extractor = OracleExtractor::new();
    let oracles = extractor.extract(model);
    (extractor, oracles)
}

#[test]
fn test_stateright_to_oracles() {
    let (extractor, oracles) = extracted(QueueModel::new(1, vec![vec![1, 2], vec![3]], 2));

    assert!(!oracles.is_empty());
    for category in [
        OracleCategory::Handoff,
        OracleCategory::BlockedProducer,
        OracleCategory::BlockedConsumer,
        OracleCategory::CloseWakesWaiter,
        OracleCategory::DrainAfterClose,
    ] {
        assert!(!extractor.by_category(category).is_empty(), "no {:?} oracle", category);
    }
}

#[test]
fn test_oracles_replay_on_bounded_queue() {
    let (_, oracles) = extracted(QueueModel::new(1, vec![vec![1, 2], vec![3]], 2));
    for oracle in &oracles {
        let trace = to_dst_trace(oracle);
        let queue = BoundedQueue::<u64>::new(trace.capacity).unwrap();
        let result = replay_oracle(&queue, &trace);
        assert!(result.passed(), "{}\n{}", result.format(), oracle.format_trace());
    }
}

#[test]
fn test_oracles_replay_on_tracked_queue_with_valid_history() {
    let model = QueueModel::new(2, vec![vec![1, 2], vec![3, 4]], 2).with_wake_mode(WakeMode::Broadcast);
    let (_, oracles) = extracted(model);
    for oracle in &oracles {
        let trace = to_dst_trace(oracle);
        let queue = TrackedQueue::with_config(QueueConfig::with_capacity(trace.capacity).wake_policy(WakePolicy::Broadcast))
            .unwrap();
        let result = replay_oracle(&queue, &trace);
        assert!(result.passed(), "{}", result.format());

        let checker = BoundedQueuePropertyChecker::new(&queue);
        assert!(checker.all_hold(), "{:?}", checker.failures());
    }
}

#[test]
fn test_violation_oracle_replays_faithfully() {
    // The path that strands a waiter under a close that wakes nobody is
    // still a legal sequence of attempts; the real queue agrees with the
    // model on every step.
    let (extractor, _) = extracted(QueueModel::new(1, vec![vec![1]], 1).with_close_wake(CloseWake::None));
    let violations = extractor.by_category(OracleCategory::Violation);
    assert_eq!(violations.len(), 1);

    let trace = to_dst_trace(violations[0]);
    let queue = BoundedQueue::<u64>::new(trace.capacity).unwrap();
    let result = replay_oracle(&queue, &trace);
    assert!(result.passed(), "{}", result.format());
}

#[test]
fn test_oracle_scheduler_walks_extracted_trace() {
    let trace = to_dst_trace(&Oracle::handoff_through_full());
    let steps = trace.steps.len();
    let mut scheduler = OracleScheduler::from_oracle(trace);
    let mut threads = Vec::new();
    while scheduler.is_following_oracle() {
        threads.push(scheduler.current_thread());
        scheduler.advance();
    }
    assert_eq!(threads.len(), steps);
    assert_eq!(threads, vec![0, 0, 0, 1, 0, 1, 1]);
    assert!(scheduler.stats().oracle_complete);
}

#[test]
fn test_verifier_agrees_with_model() {
    let result = verify_implementation::<BoundedQueue<u64>>(&VerifierConfig::thorough());
    assert!(result.passed, "{:?}", result.error);
}
