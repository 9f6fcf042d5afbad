//! Oracle-driven replay of specific interleavings.
//!
//! ```text
//! Stateright model checking
//!         │
//!         ▼
//!    Oracle extraction (expected outcome per step)
//!         │
//!         ▼
//!    OracleScheduler
//!         │
//!         ▼
//!    Real queue, one non-blocking attempt per step
//! ```
//!
//! A step whose expected outcome is `Blocked` is a thread starting to
//! wait. A later step for the same thread is that thread waking up and
//! re-checking its condition.

use serde::Serialize;

use crate::model::{DstTestableQueue, Outcome, ReferenceQueue};
use crate::random::DeterministicRng;
use crate::scheduler::{ScheduleDecision, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OracleAction {
    Put(u64),
    Take,
    Close,
}

#[derive(Debug, Clone, Serialize)]
pub struct OracleStep {
    pub thread: usize,
    pub action: OracleAction,
    /// `None` leaves the outcome to the reference model.
    pub expected: Option<Outcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OracleTrace {
    pub name: String,
    pub capacity: usize,
    pub steps: Vec<OracleStep>,
    pub description: String,
}

impl OracleTrace {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            steps: Vec::new(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn add_step(&mut self, thread: usize, action: OracleAction, expected: Option<Outcome>) {
        self.steps.push(OracleStep {
            thread,
            action,
            expected,
        });
    }

    fn expect(&mut self, thread: usize, action: OracleAction, outcome: Outcome) {
        self.add_step(thread, action, Some(outcome));
    }

    /// Highest thread index used, plus one.
    pub fn threads_count(&self) -> usize {
        self.steps.iter().map(|s| s.thread + 1).max().unwrap_or(1)
    }

    /// Producer blocks on a full queue and completes after a take.
    pub fn handoff_through_full() -> Self {
        let mut trace = Self::new("handoff_through_full", 1)
            .with_description("T0 fills the queue, blocks on the second put, T1 takes and T0 completes");
        trace.expect(0, OracleAction::Put(1), Outcome::Accepted);
        trace.expect(0, OracleAction::Put(2), Outcome::Blocked);
        trace.expect(1, OracleAction::Take, Outcome::Took(1));
        trace.expect(0, OracleAction::Put(2), Outcome::Accepted);
        trace.expect(1, OracleAction::Take, Outcome::Took(2));
        trace
    }

    /// Consumer waiting on an empty queue sees the close.
    pub fn close_wakes_empty_consumer() -> Self {
        let mut trace = Self::new("close_wakes_empty_consumer", 2)
            .with_description("T1 waits on an empty queue, T0 closes, T1 returns Closed");
        trace.expect(1, OracleAction::Take, Outcome::Blocked);
        trace.expect(0, OracleAction::Close, Outcome::Closed { transitioned: true });
        trace.expect(1, OracleAction::Take, Outcome::Drained);
        trace
    }

    /// Items accepted before close are all delivered, in order.
    pub fn drain_after_close() -> Self {
        let mut trace = Self::new("drain_after_close", 3)
            .with_description("three items then close; a late put is refused and the three drain in order");
        for item in 1..=3 {
            trace.expect(0, OracleAction::Put(item), Outcome::Accepted);
        }
        trace.expect(0, OracleAction::Close, Outcome::Closed { transitioned: true });
        trace.expect(0, OracleAction::Put(4), Outcome::Refused);
        for item in 1..=3 {
            trace.expect(1, OracleAction::Take, Outcome::Took(item));
        }
        trace.expect(1, OracleAction::Take, Outcome::Drained);
        trace.expect(2, OracleAction::Close, Outcome::Closed { transitioned: false });
        trace
    }

    /// A producer waiting on a full queue is refused once it closes.
    pub fn refused_after_close() -> Self {
        let mut trace = Self::new("refused_after_close", 1)
            .with_description("T1 waits on a full queue, T2 closes, T1 is refused and T3 drains the one item");
        trace.expect(0, OracleAction::Put(1), Outcome::Accepted);
        trace.expect(1, OracleAction::Put(2), Outcome::Blocked);
        trace.expect(2, OracleAction::Close, Outcome::Closed { transitioned: true });
        trace.expect(1, OracleAction::Put(2), Outcome::Refused);
        trace.expect(3, OracleAction::Take, Outcome::Took(1));
        trace.expect(3, OracleAction::Take, Outcome::Drained);
        trace
    }

    /// Two consumers wait; each put hands one item to one of them.
    pub fn single_wake_chain() -> Self {
        let mut trace = Self::new("single_wake_chain", 1)
            .with_description("T1 and T2 wait on an empty queue, T0 puts twice, each consumer receives one item");
        trace.expect(1, OracleAction::Take, Outcome::Blocked);
        trace.expect(2, OracleAction::Take, Outcome::Blocked);
        trace.expect(0, OracleAction::Put(1), Outcome::Accepted);
        trace.expect(1, OracleAction::Take, Outcome::Took(1));
        trace.expect(0, OracleAction::Put(2), Outcome::Accepted);
        trace.expect(2, OracleAction::Take, Outcome::Took(2));
        trace
    }

    pub fn all_oracles() -> Vec<Self> {
        vec![
            Self::handoff_through_full(),
            Self::close_wakes_empty_consumer(),
            Self::drain_after_close(),
            Self::refused_after_close(),
            Self::single_wake_chain(),
        ]
    }
}

/// Scheduler that follows an oracle trace, then falls back to seeded
/// random scheduling.
pub struct OracleScheduler {
    oracle: Option<OracleTrace>,
    position: usize,
    fallback: Scheduler,
    oracle_steps_executed: u64,
    fallback_decisions: u64,
}

impl OracleScheduler {
    pub fn new(oracle: Option<OracleTrace>, seed: u64, threads_count: usize) -> Self {
        let fallback = Scheduler::new(DeterministicRng::new(seed), threads_count.max(1), 0.2);
        Self {
            oracle,
            position: 0,
            fallback,
            oracle_steps_executed: 0,
            fallback_decisions: 0,
        }
    }

    pub fn from_oracle(oracle: OracleTrace) -> Self {
        let threads_count = oracle.threads_count();
        Self::new(Some(oracle), 12345, threads_count)
    }

    fn current_step(&self) -> Option<&OracleStep> {
        self.oracle.as_ref().and_then(|o| o.steps.get(self.position))
    }

    pub fn current_thread(&self) -> usize {
        match self.current_step() {
            Some(step) => step.thread,
            None => self.fallback.current_thread(),
        }
    }

    pub fn expected_action(&self) -> Option<OracleAction> {
        self.current_step().map(|s| s.action)
    }

    pub fn expected_outcome(&self) -> Option<Outcome> {
        self.current_step().and_then(|s| s.expected)
    }

    /// Move past the current oracle step.
    pub fn advance(&mut self) {
        if self.is_following_oracle() {
            self.position += 1;
            self.oracle_steps_executed += 1;
        }
    }

    pub fn is_following_oracle(&self) -> bool {
        self.current_step().is_some()
    }

    pub fn oracle_complete(&self) -> bool {
        !self.is_following_oracle()
    }

    pub fn decide(&mut self) -> ScheduleDecision {
        match self.current_step() {
            Some(step) => ScheduleDecision::SwitchTo(step.thread),
            None => {
                self.fallback_decisions += 1;
                self.fallback.decide()
            }
        }
    }

    pub fn stats(&self) -> OracleSchedulerStats {
        OracleSchedulerStats {
            oracle_name: self.oracle.as_ref().map(|o| o.name.clone()),
            oracle_steps_total: self.oracle.as_ref().map_or(0, |o| o.steps.len()),
            oracle_steps_executed: self.oracle_steps_executed,
            fallback_decisions: self.fallback_decisions,
            oracle_complete: self.oracle_complete(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OracleSchedulerStats {
    pub oracle_name: Option<String>,
    pub oracle_steps_total: usize,
    pub oracle_steps_executed: u64,
    pub fallback_decisions: u64,
    pub oracle_complete: bool,
}

impl OracleSchedulerStats {
    pub fn format(&self) -> String {
        match &self.oracle_name {
            Some(name) => format!(
                "Oracle '{}': {}/{} steps, {} fallback, complete={}",
                name, self.oracle_steps_executed, self.oracle_steps_total, self.fallback_decisions, self.oracle_complete
            ),
            None => format!("Random scheduling: {} decisions", self.fallback_decisions),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OracleReplayResult {
    pub oracle_name: String,
    pub steps_executed: usize,
    pub steps_total: usize,
    pub outcomes: Vec<Outcome>,
    /// Steps where the queue disagreed with the oracle's expectation
    pub mismatches: Vec<String>,
    /// Steps where the queue disagreed with the reference model
    pub divergences: Vec<String>,
}

impl OracleReplayResult {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && self.divergences.is_empty() && self.steps_executed == self.steps_total
    }

    pub fn format(&self) -> String {
        let status = if self.passed() { "PASS" } else { "FAIL" };
        let mut out = format!(
            "[{}] Oracle '{}': {}/{} steps",
            status, self.oracle_name, self.steps_executed, self.steps_total
        );
        for mismatch in &self.mismatches {
            out.push_str(&format!("\n  MISMATCH: {}", mismatch));
        }
        for divergence in &self.divergences {
            out.push_str(&format!("\n  DIVERGENCE: {}", divergence));
        }
        out
    }
}

/// Replay `oracle` against `queue`, checking each step against both the
/// oracle's expectation and the reference model.
pub fn replay_oracle<Q: DstTestableQueue>(queue: &Q, oracle: &OracleTrace) -> OracleReplayResult {
    let mut scheduler = OracleScheduler::from_oracle(oracle.clone());
    let mut model = ReferenceQueue::new(oracle.capacity);
    let mut outcomes = Vec::with_capacity(oracle.steps.len());
    let mut mismatches = Vec::new();
    let mut divergences = Vec::new();

    while let Some(action) = scheduler.expected_action() {
        let step = outcomes.len();
        let thread = scheduler.current_thread();
        let (real, modelled) = match action {
            OracleAction::Put(item) => (queue.try_put(thread as u64, item), model.put(item)),
            OracleAction::Take => (queue.try_take(thread as u64), model.take()),
            OracleAction::Close => (queue.close(thread as u64), model.close()),
        };
        if let Some(expected) = scheduler.expected_outcome() {
            if real != expected {
                mismatches.push(format!(
                    "step {}: T{} {:?} returned {:?}, oracle expected {:?}",
                    step, thread, action, real, expected
                ));
            }
        }
        if real != modelled {
            divergences.push(format!(
                "step {}: T{} {:?} returned {:?}, model says {:?}",
                step, thread, action, real, modelled
            ));
        }
        outcomes.push(real);
        scheduler.advance();
    }

    OracleReplayResult {
        oracle_name: oracle.name.clone(),
        steps_executed: outcomes.len(),
        steps_total: oracle.steps.len(),
        outcomes,
        mismatches,
        divergences,
    }
}

/// Replay every prebuilt oracle on a fresh queue from `factory`, which
/// receives the oracle's capacity.
pub fn run_all_oracles<Q: DstTestableQueue>(factory: impl Fn(usize) -> Q) -> Vec<OracleReplayResult> {
    OracleTrace::all_oracles()
        .iter()
        .map(|oracle| replay_oracle(&factory(oracle.capacity), oracle))
        .collect()
}
