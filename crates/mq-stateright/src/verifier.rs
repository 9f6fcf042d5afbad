//! Verifier that runs an implementation through the scenarios the model
//! checks.
//!
//! The model proves its properties for small configurations; this suite
//! checks that a concrete queue shows the same observable behaviour:
//! FIFO order, the capacity bound, drain after close, idempotent close and
//! immediate timeouts.

use std::collections::VecDeque;
use std::time::Duration;

use mq_queue::{BoundedQueue, QueueError};

/// Queue surface the verifier drives. Every call is bounded by `timeout`
/// so a broken implementation cannot hang the suite.
pub trait VerifiableQueue: Send + Sync + Sized {
    fn with_capacity(capacity: usize) -> Result<Self, QueueError>;

    fn put(&self, item: u64, timeout: Duration) -> Result<(), QueueError>;

    fn take(&self, timeout: Duration) -> Result<u64, QueueError>;

    /// `true` if this call closed the queue.
    fn close(&self) -> bool;

    fn len(&self) -> usize;

    /// Items currently stored, head first.
    fn contents(&self) -> Vec<u64>;
}

impl VerifiableQueue for BoundedQueue<u64> {
    fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        BoundedQueue::new(capacity)
    }

    fn put(&self, item: u64, timeout: Duration) -> Result<(), QueueError> {
        self.try_put(item, timeout).map_err(QueueError::from)
    }

    fn take(&self, timeout: Duration) -> Result<u64, QueueError> {
        self.try_take(timeout)
    }

    fn close(&self) -> bool {
        BoundedQueue::close(self)
    }

    fn len(&self) -> usize {
        BoundedQueue::len(self)
    }

    fn contents(&self) -> Vec<u64> {
        self.to_vec()
    }
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub passed: bool,
    pub operations_count: usize,
    pub invariants_checked: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub capacity: usize,
    /// Operations in the interleaved put/take scenario.
    pub operations_count: usize,
    /// Check invariants after every N operations.
    pub check_interval: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            operations_count: 100,
            check_interval: 10,
        }
    }
}

impl VerifierConfig {
    pub fn quick() -> Self {
        Self {
            capacity: 2,
            operations_count: 50,
            check_interval: 10,
        }
    }

    pub fn thorough() -> Self {
        Self {
            capacity: 8,
            operations_count: 500,
            check_interval: 5,
        }
    }
}

const INVARIANTS: [&str; 5] = [
    "BoundedCapacity",
    "FifoOrder",
    "DrainAfterClose",
    "IdempotentClose",
    "ImmediateTimeout",
];

/// Sequential shadow used to check contents after each step.
struct Session<'a, Q> {
    queue: &'a Q,
    shadow: VecDeque<u64>,
    capacity: usize,
    operations_count: usize,
}

impl<'a, Q: VerifiableQueue> Session<'a, Q> {
    fn new(queue: &'a Q, capacity: usize) -> Self {
        Self {
            queue,
            shadow: VecDeque::new(),
            capacity,
            operations_count: 0,
        }
    }

    fn put(&mut self, item: u64) -> Result<(), String> {
        self.operations_count += 1;
        let full = self.shadow.len() >= self.capacity;
        match (self.queue.put(item, Duration::ZERO), full) {
            (Ok(()), false) => {
                self.shadow.push_back(item);
                Ok(())
            }
            (Err(QueueError::Timeout), true) => Ok(()),
            (Ok(()), true) => Err(format!(
                "BoundedCapacity violated: put({}) accepted with {} of {} slots used",
                item,
                self.shadow.len(),
                self.capacity
            )),
            (other, _) => Err(format!("put({}) returned {:?} on an open queue", item, other)),
        }
    }

    fn take(&mut self) -> Result<(), String> {
        self.operations_count += 1;
        match (self.queue.take(Duration::ZERO), self.shadow.pop_front()) {
            (Ok(item), Some(expected)) if item == expected => Ok(()),
            (Err(QueueError::Timeout), None) => Ok(()),
            (actual, expected) => Err(format!(
                "FifoOrder violated: take() returned {:?}, expected {:?}",
                actual, expected
            )),
        }
    }

    fn check(&self, context: &str) -> Result<(), String> {
        let len = self.queue.len();
        if len > self.capacity {
            return Err(format!(
                "BoundedCapacity violated {}: len {} exceeds capacity {}",
                context, len, self.capacity
            ));
        }
        let contents = self.queue.contents();
        if contents.iter().ne(self.shadow.iter()) {
            return Err(format!(
                "FifoOrder violated {}: contents {:?}, expected {:?}",
                context, contents, self.shadow
            ));
        }
        Ok(())
    }
}

/// Run the scenario suite against a fresh `Q` per scenario.
pub fn verify_implementation<Q: VerifiableQueue>(config: &VerifierConfig) -> VerificationResult {
    let mut operations_count = 0;
    let outcome = run_scenarios::<Q>(config, &mut operations_count);
    VerificationResult {
        passed: outcome.is_ok(),
        operations_count,
        invariants_checked: INVARIANTS.iter().map(|s| s.to_string()).collect(),
        error: outcome.err(),
    }
}

fn fresh<Q: VerifiableQueue>(capacity: usize) -> Result<Q, String> {
    Q::with_capacity(capacity).map_err(|e| format!("construction with capacity {} failed: {}", capacity, e))
}

fn run_scenarios<Q: VerifiableQueue>(config: &VerifierConfig, operations_count: &mut usize) -> Result<(), String> {
    let capacity = config.capacity.max(1);

    if Q::with_capacity(0).is_ok() {
        return Err("capacity 0 was accepted".to_string());
    }

    // Fill past capacity, then drain in order.
    let queue = fresh::<Q>(capacity)?;
    let mut session = Session::new(&queue, capacity);
    for item in 1..=(capacity as u64 + 2) {
        session.put(item)?;
    }
    session.check("after filling")?;
    for _ in 0..capacity + 1 {
        session.take()?;
    }
    session.check("after draining")?;
    *operations_count += session.operations_count;

    // Interleaved puts and takes.
    let queue = fresh::<Q>(capacity)?;
    let mut session = Session::new(&queue, capacity);
    for i in 0..config.operations_count {
        if i % 3 == 2 {
            session.take()?;
        } else {
            session.put(1000 + i as u64)?;
        }
        if config.check_interval > 0 && session.operations_count % config.check_interval == 0 {
            session.check(&format!("at operation {}", session.operations_count))?;
        }
    }
    while !session.shadow.is_empty() {
        session.take()?;
    }
    session.check("after interleaving")?;
    *operations_count += session.operations_count;

    // Close with K items queued: exactly K takes succeed, in order.
    let queue = fresh::<Q>(capacity)?;
    let queued: Vec<u64> = (1..=capacity as u64).map(|i| i * 10).collect();
    for &item in &queued {
        queue.put(item, Duration::ZERO).map_err(|e| format!("put({}) failed: {}", item, e))?;
    }
    if !queue.close() {
        return Err("IdempotentClose violated: first close() returned false".to_string());
    }
    if queue.close() {
        return Err("IdempotentClose violated: second close() returned true".to_string());
    }
    match queue.put(999, Duration::from_millis(10)) {
        Err(QueueError::Closed) => {}
        other => return Err(format!("DrainAfterClose violated: put after close returned {:?}", other)),
    }
    for &expected in &queued {
        match queue.take(Duration::ZERO) {
            Ok(item) if item == expected => {}
            other => {
                return Err(format!(
                    "DrainAfterClose violated: expected Ok({}) after close, got {:?}",
                    expected, other
                ))
            }
        }
    }
    for _ in 0..2 {
        match queue.take(Duration::from_millis(10)) {
            Err(QueueError::Closed) => {}
            other => return Err(format!("DrainAfterClose violated: drained take returned {:?}", other)),
        }
    }
    *operations_count += queued.len() + 6;

    // Zero timeout on an unsatisfiable condition returns at once.
    let queue = fresh::<Q>(1)?;
    match queue.take(Duration::ZERO) {
        Err(QueueError::Timeout) => {}
        other => return Err(format!("ImmediateTimeout violated: take on empty returned {:?}", other)),
    }
    queue.put(1, Duration::ZERO).map_err(|e| format!("put(1) failed: {}", e))?;
    match queue.put(2, Duration::ZERO) {
        Err(QueueError::Timeout) => {}
        other => return Err(format!("ImmediateTimeout violated: put on full returned {:?}", other)),
    }
    if queue.len() != 1 {
        return Err(format!("ImmediateTimeout violated: timed-out put left len {}", queue.len()));
    }
    *operations_count += 3;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_verifier_with_bounded_queue() {
        for config in [VerifierConfig::quick(), VerifierConfig::default(), VerifierConfig::thorough()] {
            let result = verify_implementation::<BoundedQueue<u64>>(&config);
            assert!(result.passed, "{:?}", result.error);
            assert!(result.operations_count > config.operations_count);
            assert!(result.invariants_checked.contains(&"FifoOrder".to_string()));
        }
    }

    // Stack instead of a queue, and close is not idempotent.
    struct StackQueue {
        capacity: usize,
        items: Mutex<Vec<u64>>,
        closed: Mutex<bool>,
    }

    impl VerifiableQueue for StackQueue {
        fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
            if capacity == 0 {
                return Err(QueueError::InvalidCapacity { capacity });
            }
            Ok(Self {
                capacity,
                items: Mutex::new(Vec::new()),
                closed: Mutex::new(false),
            })
        }

        fn put(&self, item: u64, _timeout: Duration) -> Result<(), QueueError> {
            let mut items = self.items.lock().unwrap();
            if *self.closed.lock().unwrap() {
                return Err(QueueError::Closed);
            }
            if items.len() >= self.capacity {
                return Err(QueueError::Timeout);
            }
            items.push(item);
            Ok(())
        }

        fn take(&self, _timeout: Duration) -> Result<u64, QueueError> {
            match self.items.lock().unwrap().pop() {
                Some(item) => Ok(item),
                None if *self.closed.lock().unwrap() => Err(QueueError::Closed),
                None => Err(QueueError::Timeout),
            }
        }

        fn close(&self) -> bool {
            *self.closed.lock().unwrap() = true;
            true
        }

        fn len(&self) -> usize {
            self.items.lock().unwrap().len()
        }

        fn contents(&self) -> Vec<u64> {
            self.items.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_verifier_catches_lifo() {
        let result = verify_implementation::<StackQueue>(&VerifierConfig::quick());
        assert!(!result.passed);
        assert!(
            result.error.as_ref().unwrap().contains("FifoOrder"),
            "{:?}",
            result.error
        );
    }
}
