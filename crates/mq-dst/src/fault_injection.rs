//! Fault injection at operation boundaries.
//!
//! Faults happen in the runner, never inside the queue. The queue under
//! test is unchanged; the runner decides before or after each operation
//! whether the calling thread crashes, stalls or has its wait cancelled.
//!
//! | Fault | Point | Effect |
//! |-------|-------|--------|
//! | `ThreadCrash` | before | operation never starts |
//! | `ThreadCrash` | after | operation completed, caller never sees the result |
//! | `Delay` | either | simulated clock advances |
//! | `Cancellation` | before | a wait that would block is abandoned |
//!
//! After every operation the real outcome is compared with the reference
//! model. Any difference is a conformance failure.

use serde::Serialize;
use tracing::debug;

use crate::env::DstEnv;
use crate::fault::FaultConfig;
use crate::model::{DstTestableQueue, Outcome, ReferenceQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    BeforeOperation,
    AfterOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaultType {
    ThreadCrash,
    Delay,
    Cancellation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstOp {
    Put(u64),
    Take,
    Close,
}

/// Drives a queue one operation at a time, injecting faults and checking
/// every outcome against the reference model.
pub struct DstRunner<Q> {
    queue: Q,
    model: ReferenceQueue,
    env: DstEnv,
    stats: DstStats,
    divergences: Vec<String>,
}

impl<Q: DstTestableQueue> DstRunner<Q> {
    pub fn new(queue: Q, seed: u64) -> Self {
        Self::with_faults(queue, seed, FaultConfig::default())
    }

    pub fn with_faults(queue: Q, seed: u64, fault_config: FaultConfig) -> Self {
        let model = ReferenceQueue::new(queue.capacity());
        Self {
            queue,
            model,
            env: DstEnv::with_faults(seed, fault_config),
            stats: DstStats {
                seed,
                ..DstStats::default()
            },
            divergences: Vec::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.stats.seed
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn model(&self) -> &ReferenceQueue {
        &self.model
    }

    pub fn execute(&mut self, thread: u64, op: DstOp) -> Result<Outcome, FaultType> {
        if let Some(fault) = self.maybe_inject_fault(FaultPoint::BeforeOperation) {
            match fault {
                FaultType::ThreadCrash => {
                    self.stats.abandoned_operations += 1;
                    return Err(fault);
                }
                FaultType::Cancellation if self.would_block(op) => {
                    self.stats.cancelled_waits += 1;
                    return Err(fault);
                }
                FaultType::Cancellation | FaultType::Delay => {}
            }
        }

        let real = match op {
            DstOp::Put(item) => self.queue.try_put(thread, item),
            DstOp::Take => self.queue.try_take(thread),
            DstOp::Close => self.queue.close(thread),
        };
        let expected = match op {
            DstOp::Put(item) => self.model.put(item),
            DstOp::Take => self.model.take(),
            DstOp::Close => self.model.close(),
        };
        self.stats.operations_count += 1;
        if real == Outcome::Blocked {
            self.stats.blocked_attempts += 1;
        }
        if real != expected {
            self.diverge(format!(
                "step {}: thread {} {:?} returned {:?}, expected {:?}",
                self.stats.operations_count, thread, op, real, expected
            ));
        }

        if self.maybe_inject_fault(FaultPoint::AfterOperation) == Some(FaultType::ThreadCrash) {
            self.stats.abandoned_operations += 1;
            return Err(FaultType::ThreadCrash);
        }
        Ok(real)
    }

    pub fn put(&mut self, thread: u64, item: u64) -> Result<Outcome, FaultType> {
        self.execute(thread, DstOp::Put(item))
    }

    pub fn take(&mut self, thread: u64) -> Result<Outcome, FaultType> {
        self.execute(thread, DstOp::Take)
    }

    pub fn close(&mut self, thread: u64) -> Result<Outcome, FaultType> {
        self.execute(thread, DstOp::Close)
    }

    fn would_block(&self, op: DstOp) -> bool {
        match op {
            DstOp::Put(_) => !self.model.is_closed() && self.model.len() >= self.model.capacity(),
            DstOp::Take => !self.model.is_closed() && self.model.is_empty(),
            DstOp::Close => false,
        }
    }

    fn maybe_inject_fault(&mut self, point: FaultPoint) -> Option<FaultType> {
        let delayed = self.env.maybe_delay();
        if delayed > 0 {
            self.stats.delays_count += 1;
        }
        if !self.env.fault().should_fail() {
            return None;
        }
        let choices: &[FaultType] = match point {
            FaultPoint::BeforeOperation => &[FaultType::ThreadCrash, FaultType::Delay, FaultType::Cancellation],
            FaultPoint::AfterOperation => &[FaultType::ThreadCrash, FaultType::Delay],
        };
        let fault = self.env.fault().pick(choices)?;
        if fault == FaultType::Delay {
            let ns = self.env.rng().gen_range(1..=1_000_000u64);
            self.env.clock().advance_ns(ns);
        }
        self.stats.faults_injected += 1;
        Some(fault)
    }

    fn diverge(&mut self, message: String) {
        debug!(seed = self.stats.seed, %message, "queue diverged from reference model");
        self.divergences.push(message);
    }

    /// Capacity bound and identical contents (which covers FIFO).
    pub fn check_state(&self) -> Result<(), String> {
        let contents = self.queue.contents();
        if contents.len() > self.queue.capacity() {
            return Err(format!(
                "{} items stored with capacity {}",
                contents.len(),
                self.queue.capacity()
            ));
        }
        if contents != self.model.contents() {
            return Err(format!(
                "contents {:?} differ from model {:?}",
                contents,
                self.model.contents()
            ));
        }
        Ok(())
    }

    pub fn divergences(&self) -> &[String] {
        &self.divergences
    }

    pub fn stats(&self) -> DstStats {
        DstStats {
            sim_elapsed_ns: self.env.now_ns(),
            ..self.stats.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DstStats {
    pub seed: u64,
    pub operations_count: u64,
    pub faults_injected: u64,
    pub abandoned_operations: u64,
    pub cancelled_waits: u64,
    pub blocked_attempts: u64,
    pub delays_count: u64,
    pub sim_elapsed_ns: u64,
}

impl DstStats {
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} ops={} faults={} abandoned={} cancelled={} blocked={}",
            self.seed,
            self.operations_count,
            self.faults_injected,
            self.abandoned_operations,
            self.cancelled_waits,
            self.blocked_attempts
        )
    }
}

#[derive(Debug, Serialize)]
pub struct DstResult {
    pub passed: bool,
    pub conforms: bool,
    pub state_error: Option<String>,
    pub divergences: Vec<String>,
    pub stats: DstStats,
    pub fault_errors: Vec<FaultType>,
}

impl DstResult {
    pub fn format(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut result = format!("[{}] {}", status, self.stats.format());
        for divergence in &self.divergences {
            result.push_str(&format!("\n  DIVERGENCE: {}", divergence));
        }
        if let Some(error) = &self.state_error {
            result.push_str(&format!("\n  VIOLATION: {}", error));
        }
        result
    }
}

/// Run `operations` on thread 0 with faults, then check the final state.
pub fn run_dst_scenario<Q: DstTestableQueue>(queue: Q, seed: u64, operations: &[DstOp]) -> DstResult {
    let mut runner = DstRunner::new(queue, seed);
    let mut fault_errors = Vec::new();

    for &op in operations {
        if let Err(fault) = runner.execute(0, op) {
            fault_errors.push(fault);
        }
    }

    let state_error = runner.check_state().err();
    let divergences = runner.divergences().to_vec();
    let conforms = divergences.is_empty();
    DstResult {
        passed: conforms && state_error.is_none(),
        conforms,
        state_error,
        divergences,
        stats: runner.stats(),
        fault_errors,
    }
}

/// `count` random operations, mostly puts and takes with the occasional
/// close near the end.
pub fn random_ops(seed: u64, count: usize) -> Vec<DstOp> {
    let mut rng = crate::random::DeterministicRng::new(seed);
    (0..count)
        .map(|i| match rng.gen_range(0..100u32) {
            0..=47 => DstOp::Put(i as u64),
            48..=97 => DstOp::Take,
            _ if i * 4 >= count * 3 => DstOp::Close,
            _ => DstOp::Take,
        })
        .collect()
}
