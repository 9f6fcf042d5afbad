//! Multi-producer multi-consumer simulation on logical threads.
//!
//! Producers and consumers are interleaved by the seeded scheduler on a
//! single OS thread. An attempt that would block leaves its thread
//! waiting; the thread retries whenever it is scheduled again, the way a
//! woken waiter re-checks its predicate. Timed attempts carry a deadline
//! on the simulated clock and give up once it passes. Once every producer
//! has finished the harness closes the queue, and consumers exit when
//! they observe the drained state.
//!
//! Every attempt is also applied to the reference model, so any
//! difference in outcome is reported as a violation together with the
//! seed.

use serde::Serialize;
use tracing::{debug, trace};

use crate::env::DstEnv;
use crate::fault::FaultConfig;
use crate::fault_injection::FaultType;
use crate::model::{DstTestableQueue, Outcome, ReferenceQueue};
use crate::scheduler::ScheduleDecision;

#[derive(Debug, Clone, Serialize)]
pub struct HarnessConfig {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u64,
    pub capacity: usize,
    /// Probability of a context switch after each attempt
    pub switch_probability: f64,
    /// Probability that a fresh attempt carries a deadline
    pub timed_probability: f64,
    pub max_timeout_ns: u64,
    pub fault_config: FaultConfig,
    /// Compare queue and model contents every N attempts (0 = never)
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            producers: 3,
            consumers: 2,
            items_per_producer: 50,
            capacity: 4,
            switch_probability: 0.3,
            timed_probability: 0.2,
            max_timeout_ns: 5_000,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 10,
        }
    }
}

impl HarnessConfig {
    pub fn quick() -> Self {
        Self {
            producers: 2,
            consumers: 1,
            items_per_producer: 20,
            capacity: 2,
            switch_probability: 0.2,
            timed_probability: 0.1,
            max_timeout_ns: 2_000,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 5,
        }
    }

    pub fn stress() -> Self {
        Self {
            producers: 8,
            consumers: 4,
            items_per_producer: 500,
            capacity: 8,
            switch_probability: 0.4,
            timed_probability: 0.3,
            max_timeout_ns: 20_000,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 100,
        }
    }

    pub fn threads_count(&self) -> usize {
        self.producers + self.consumers
    }

    pub fn total_items(&self) -> u64 {
        self.producers as u64 * self.items_per_producer
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessResult {
    pub seed: u64,
    pub operations_count: u64,
    pub context_switches_count: u64,
    pub faults_injected_count: u64,
    pub invariant_checks_count: u64,
    pub items_accepted: u64,
    pub items_taken: u64,
    pub timeouts_count: u64,
    pub cancellations_count: u64,
    pub crashed_producers: u64,
    pub sim_elapsed_ns: u64,
    pub all_invariants_held: bool,
    pub first_violation: Option<String>,
}

impl HarnessResult {
    pub fn format(&self) -> String {
        let status = if self.all_invariants_held { "PASS" } else { "FAIL" };
        let mut out = format!(
            "[{}] DST_SEED={} ops={} switches={} faults={} accepted={} taken={} timeouts={} cancelled={}",
            status,
            self.seed,
            self.operations_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.items_accepted,
            self.items_taken,
            self.timeouts_count,
            self.cancellations_count
        );
        if let Some(violation) = &self.first_violation {
            out.push_str(&format!("\n  VIOLATION: {}", violation));
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Producer { index: u64, next: u64 },
    Consumer,
}

#[derive(Debug)]
struct LogicalThread {
    role: Role,
    finished: bool,
    /// Inside an attempt that found the queue unavailable.
    waiting: bool,
    deadline_ns: Option<u64>,
    /// Progress epoch at which the thread last found itself blocked.
    blocked_at: Option<u64>,
}

impl LogicalThread {
    fn is_producer(&self) -> bool {
        matches!(self.role, Role::Producer { .. })
    }
}

/// Item values encode the producer in the high bits and the per-producer
/// sequence number in the low bits.
pub fn item_for(producer: u64, sequence: u64) -> u64 {
    (producer << 32) | sequence
}

pub struct DstHarness {
    env: DstEnv,
    config: HarnessConfig,
    model: ReferenceQueue,
    threads: Vec<LogicalThread>,
    accepted: Vec<u64>,
    taken: Vec<u64>,
    closed: bool,
    epoch: u64,
    operations_count: u64,
    context_switches_count: u64,
    faults_injected_count: u64,
    invariant_checks_count: u64,
    timeouts_count: u64,
    cancellations_count: u64,
    crashed_producers: u64,
    violation: Option<String>,
}

impl DstHarness {
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        debug_assert!(config.capacity > 0, "capacity must be positive");
        debug_assert!(config.threads_count() <= 64, "Too many threads for DST: {}", config.threads_count());

        let env = DstEnv::with_scheduler_and_faults(
            seed,
            config.threads_count().max(1),
            config.switch_probability,
            config.fault_config.clone(),
        );
        let producers = (0..config.producers as u64).map(|index| Role::Producer { index, next: 0 });
        let consumers = (0..config.consumers).map(|_| Role::Consumer);
        let threads = producers
            .chain(consumers)
            .map(|role| LogicalThread {
                role,
                finished: false,
                waiting: false,
                deadline_ns: None,
                blocked_at: None,
            })
            .collect();

        Self {
            env,
            model: ReferenceQueue::new(config.capacity),
            config,
            threads,
            accepted: Vec::new(),
            taken: Vec::new(),
            closed: false,
            epoch: 0,
            operations_count: 0,
            context_switches_count: 0,
            faults_injected_count: 0,
            invariant_checks_count: 0,
            timeouts_count: 0,
            cancellations_count: 0,
            crashed_producers: 0,
            violation: None,
        }
    }

    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Items in acceptance order.
    pub fn accepted(&self) -> &[u64] {
        &self.accepted
    }

    /// Items in the order consumers received them.
    pub fn taken(&self) -> &[u64] {
        &self.taken
    }

    /// Run the scenario against `queue`, whose capacity must match the
    /// configured one.
    pub fn run<Q: DstTestableQueue>(&mut self, queue: &Q) -> HarnessResult {
        if queue.capacity() != self.config.capacity {
            self.stop_with_violation(format!(
                "queue capacity {} does not match configured {}",
                queue.capacity(),
                self.config.capacity
            ));
            return self.result();
        }

        let step_budget = self.config.total_items() * 64 + 10_000;
        self.maybe_close(queue);
        while self.violation.is_none() && !self.all_finished() {
            if self.operations_count >= step_budget {
                self.stop_with_violation(format!("no completion after {} attempts", step_budget));
                break;
            }
            let thread = self.next_thread();
            self.step(queue, thread);
            self.maybe_close(queue);

            if self.should_check_invariants() {
                self.check_invariants(queue);
            }
            if self.is_stalled() {
                self.stop_with_violation(format!(
                    "every remaining thread is blocked without a deadline (epoch {})",
                    self.epoch
                ));
            }
        }

        if self.violation.is_none() {
            self.check_invariants(queue);
            self.check_delivery();
        }
        self.result()
    }

    fn all_finished(&self) -> bool {
        self.threads.iter().all(|t| t.finished)
    }

    fn eligible(&self) -> Vec<usize> {
        (0..self.threads.len()).filter(|&i| !self.threads[i].finished).collect()
    }

    fn next_thread(&mut self) -> usize {
        let eligible = self.eligible();
        let Some(scheduler) = self.env.scheduler() else {
            return eligible[0];
        };
        let before = scheduler.current_thread();
        let mut current = match scheduler.decide() {
            ScheduleDecision::Continue => before,
            ScheduleDecision::SwitchTo(next) => next,
        };
        if !eligible.contains(&current) {
            current = scheduler.pick(&eligible);
        }
        if current != before {
            self.context_switches_count += 1;
        }
        current
    }

    fn step<Q: DstTestableQueue>(&mut self, queue: &Q, index: usize) {
        self.operations_count += 1;
        let tick = self.env.rng().gen_range(1..=1_000u64);
        self.env.clock().advance_ns(tick);
        self.env.maybe_delay();

        if self.env.fault().should_fail() {
            self.faults_injected_count += 1;
            let fault = self
                .env
                .fault()
                .pick(&[FaultType::ThreadCrash, FaultType::Delay, FaultType::Cancellation]);
            match fault {
                Some(FaultType::ThreadCrash) if self.threads[index].is_producer() => {
                    debug!(thread = index, "producer crashed");
                    self.crashed_producers += 1;
                    self.finish(index);
                    return;
                }
                Some(FaultType::Cancellation) if self.threads[index].waiting => {
                    trace!(thread = index, "wait cancelled");
                    self.cancellations_count += 1;
                    self.reset_attempt(index);
                    return;
                }
                Some(FaultType::Delay) => {
                    let ns = self.env.rng().gen_range(1..=10_000u64);
                    self.env.clock().advance_ns(ns);
                }
                _ => {}
            }
        }

        if !self.threads[index].waiting {
            self.threads[index].deadline_ns = if self.env.rng().gen_bool(self.config.timed_probability) {
                let timeout = self.env.rng().gen_range(0..=self.config.max_timeout_ns);
                Some(self.env.clock().deadline_after_ns(timeout))
            } else {
                None
            };
        }

        let thread_id = index as u64;
        let (real, expected, item) = match self.threads[index].role {
            Role::Producer { index: producer, next } => {
                let item = item_for(producer, next);
                (queue.try_put(thread_id, item), self.model.put(item), Some(item))
            }
            Role::Consumer => (queue.try_take(thread_id), self.model.take(), None),
        };
        if real != expected {
            self.stop_with_violation(format!(
                "thread {} got {:?} where the model expected {:?}",
                index, real, expected
            ));
            return;
        }

        match real {
            Outcome::Blocked => {
                let now = self.env.now_ns();
                let timed_out = self.threads[index].deadline_ns.is_some_and(|deadline| now >= deadline);
                if timed_out {
                    trace!(thread = index, "attempt timed out");
                    self.timeouts_count += 1;
                    self.reset_attempt(index);
                } else {
                    let epoch = self.epoch;
                    let thread = &mut self.threads[index];
                    thread.waiting = true;
                    thread.blocked_at = Some(epoch);
                    self.yield_from(index);
                }
            }
            Outcome::Accepted => {
                if let Some(item) = item {
                    self.accepted.push(item);
                }
                self.progress();
                self.reset_attempt(index);
                if let Role::Producer { next, .. } = &mut self.threads[index].role {
                    *next += 1;
                    if *next >= self.config.items_per_producer {
                        self.finish(index);
                    }
                }
            }
            Outcome::Took(item) => {
                self.taken.push(item);
                self.progress();
                self.reset_attempt(index);
            }
            Outcome::Drained | Outcome::Refused => self.finish(index),
            Outcome::Closed { .. } => {}
        }
    }

    /// A blocked thread hands the processor to someone else if anyone
    /// else can run.
    fn yield_from(&mut self, index: usize) {
        let others: Vec<usize> = self.eligible().into_iter().filter(|&i| i != index).collect();
        if others.is_empty() {
            return;
        }
        if let Some(scheduler) = self.env.scheduler() {
            scheduler.pick(&others);
            self.context_switches_count += 1;
        }
    }

    fn reset_attempt(&mut self, index: usize) {
        let thread = &mut self.threads[index];
        thread.waiting = false;
        thread.deadline_ns = None;
        thread.blocked_at = None;
    }

    fn finish(&mut self, index: usize) {
        self.reset_attempt(index);
        self.threads[index].finished = true;
        self.progress();
    }

    fn progress(&mut self) {
        self.epoch += 1;
    }

    fn maybe_close<Q: DstTestableQueue>(&mut self, queue: &Q) {
        if self.closed || self.threads.iter().any(|t| t.is_producer() && !t.finished) {
            return;
        }
        let closer = self.threads.len() as u64;
        let real = queue.close(closer);
        let expected = self.model.close();
        self.closed = true;
        self.progress();
        debug!(seed = self.seed(), accepted = self.accepted.len(), "producers done, queue closed");
        if real != expected {
            self.stop_with_violation(format!("close returned {:?}, expected {:?}", real, expected));
        }
    }

    /// Every live thread is blocked without a deadline and nothing has
    /// changed since each of them blocked.
    fn is_stalled(&self) -> bool {
        let mut live = self.threads.iter().filter(|t| !t.finished).peekable();
        live.peek().is_some()
            && live.all(|t| t.waiting && t.deadline_ns.is_none() && t.blocked_at == Some(self.epoch))
    }

    fn should_check_invariants(&self) -> bool {
        self.config.invariant_check_interval != 0
            && self.operations_count % self.config.invariant_check_interval == 0
    }

    fn check_invariants<Q: DstTestableQueue>(&mut self, queue: &Q) {
        self.invariant_checks_count += 1;
        let contents = queue.contents();
        if contents.len() > queue.capacity() {
            self.stop_with_violation(format!(
                "{} items stored with capacity {}",
                contents.len(),
                queue.capacity()
            ));
        } else if contents != self.model.contents() {
            self.stop_with_violation(format!(
                "contents {:?} differ from model {:?}",
                contents,
                self.model.contents()
            ));
        }
    }

    /// After a full run every accepted item was taken exactly once, in
    /// acceptance order.
    fn check_delivery(&mut self) {
        if self.taken == self.accepted {
            return;
        }
        let position = self
            .taken
            .iter()
            .zip(&self.accepted)
            .position(|(taken, accepted)| taken != accepted)
            .unwrap_or(self.taken.len().min(self.accepted.len()));
        self.stop_with_violation(format!(
            "delivery differs at position {}: {} accepted, {} taken",
            position,
            self.accepted.len(),
            self.taken.len()
        ));
    }

    fn stop_with_violation(&mut self, message: String) {
        if self.violation.is_none() {
            debug!(seed = self.seed(), %message, "harness violation");
            self.violation = Some(message);
        }
    }

    fn result(&self) -> HarnessResult {
        HarnessResult {
            seed: self.env.seed(),
            operations_count: self.operations_count,
            context_switches_count: self.context_switches_count,
            faults_injected_count: self.faults_injected_count,
            invariant_checks_count: self.invariant_checks_count,
            items_accepted: self.accepted.len() as u64,
            items_taken: self.taken.len() as u64,
            timeouts_count: self.timeouts_count,
            cancellations_count: self.cancellations_count,
            crashed_producers: self.crashed_producers,
            sim_elapsed_ns: self.env.now_ns(),
            all_invariants_held: self.violation.is_none(),
            first_violation: self.violation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mq_queue::{BoundedQueue, BuggyQueue, QueueBug, TrackedQueue};

    use super::*;

    #[test]
    fn test_quick_config_delivers_everything() {
        let config = HarnessConfig::quick();
        let queue = BoundedQueue::<u64>::new(config.capacity).unwrap();
        let mut harness = DstHarness::new(42, config);
        let result = harness.run(&queue);

        assert!(result.all_invariants_held, "{}", result.format());
        assert_eq!(result.items_accepted, 40);
        assert_eq!(result.items_taken, 40);
        assert_eq!(harness.taken(), harness.accepted());
        assert!(queue.is_closed() && queue.is_empty());
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = |seed| {
            let config = HarnessConfig::default();
            let queue = BoundedQueue::<u64>::new(config.capacity).unwrap();
            let mut harness = DstHarness::new(seed, config);
            let result = harness.run(&queue);
            (harness.taken().to_vec(), result.operations_count, result.faults_injected_count)
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_many_seeds_with_faults() {
        for seed in 1..=25 {
            let config = HarnessConfig::default();
            let queue = TrackedQueue::new(config.capacity).unwrap();
            let result = DstHarness::new(seed, config).run(&queue);
            assert!(result.all_invariants_held, "{}", result.format());
        }
    }

    #[test]
    fn test_producers_only_stall_is_detected() {
        let config = HarnessConfig {
            producers: 2,
            consumers: 0,
            items_per_producer: 4,
            capacity: 2,
            timed_probability: 0.0,
            fault_config: FaultConfig::none(),
            ..HarnessConfig::default()
        };
        let queue = BoundedQueue::<u64>::new(2).unwrap();
        let result = DstHarness::new(3, config).run(&queue);
        assert!(!result.all_invariants_held);
        assert!(result.first_violation.unwrap().contains("blocked"));
    }

    #[test]
    fn test_consumers_only_drain_immediately() {
        let config = HarnessConfig {
            producers: 0,
            consumers: 3,
            fault_config: FaultConfig::none(),
            ..HarnessConfig::default()
        };
        let queue = BoundedQueue::<u64>::new(config.capacity).unwrap();
        let result = DstHarness::new(5, config).run(&queue);
        assert!(result.all_invariants_held, "{}", result.format());
        assert_eq!(result.items_taken, 0);
    }

    #[test]
    fn test_lifo_bug_is_caught() {
        let config = HarnessConfig {
            fault_config: FaultConfig::none(),
            ..HarnessConfig::quick()
        };
        let queue = BuggyQueue::new(QueueBug::Lifo, config.capacity);
        let result = DstHarness::new(11, config).run(&queue);
        assert!(!result.all_invariants_held);
    }

    #[test]
    fn test_timed_attempts_time_out() {
        let config = HarnessConfig {
            producers: 4,
            consumers: 1,
            items_per_producer: 30,
            capacity: 1,
            timed_probability: 1.0,
            max_timeout_ns: 0,
            fault_config: FaultConfig::none(),
            ..HarnessConfig::default()
        };
        let queue = BoundedQueue::<u64>::new(1).unwrap();
        let result = DstHarness::new(9, config).run(&queue);
        assert!(result.all_invariants_held, "{}", result.format());
        assert!(result.timeouts_count > 0);
        assert_eq!(result.items_taken, 120);
    }

    #[test]
    fn test_item_encoding() {
        assert_eq!(item_for(0, 5), 5);
        assert_eq!(item_for(2, 1) >> 32, 2);
    }
}
