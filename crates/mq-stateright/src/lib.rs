//! # mq-stateright
//!
//! Stateright model of the bounded blocking queue monitor.
//!
//! The model works at the level of critical sections and condition
//! variable wait sets, so it can show that the wake-up discipline never
//! strands a waiter and that a close which wakes nobody does.
//!
//! ## Usage
//!
//! 1. Model checking:
//!    ```ignore
//!    cargo test -p mq-stateright
//!    ```
//!
//! 2. Implementation verification:
//!    ```ignore
//!    use mq_stateright::verifier::{verify_implementation, VerifierConfig};
//!    let result = verify_implementation::<BoundedQueue<u64>>(&VerifierConfig::default());
//!    assert!(result.passed);
//!    ```
//!
//! 3. Oracle extraction for DST:
//!    ```ignore
//!    use mq_stateright::{OracleExtractor, QueueModel};
//!    let oracles = OracleExtractor::new().extract(QueueModel::new(1, vec![vec![1, 2], vec![3]], 2));
//!    ```

pub mod oracle;
pub mod queue_model;
pub mod verifier;

pub use oracle::{
    oracle_from_actions, ExpectedOutcome, Oracle, OracleAction, OracleActionType, OracleCategory, OracleExtractor,
};
pub use queue_model::{CloseWake, MonitorState, Phase, QueueAction, QueueModel, Role, StepOutcome, WaitSet, WakeMode};
pub use verifier::{verify_implementation, VerifiableQueue, VerificationResult, VerifierConfig};
