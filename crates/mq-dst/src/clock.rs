//! Simulated time. Nothing in a simulation reads the wall clock.

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ns: u64,
}

impl SimClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    pub fn advance_ns(&mut self, ns: u64) {
        self.now_ns = self.now_ns.saturating_add(ns);
    }

    pub fn advance(&mut self, by: Duration) {
        self.advance_ns(u64::try_from(by.as_nanos()).unwrap_or(u64::MAX));
    }

    /// Absolute simulated deadline `timeout_ns` from now.
    pub fn deadline_after_ns(&self, timeout_ns: u64) -> u64 {
        self.now_ns.saturating_add(timeout_ns)
    }

    pub fn has_passed(&self, deadline_ns: u64) -> bool {
        self.now_ns >= deadline_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlines() {
        let mut clock = SimClock::new();
        let deadline = clock.deadline_after_ns(1_000);
        assert!(!clock.has_passed(deadline));
        clock.advance(Duration::from_nanos(999));
        assert!(!clock.has_passed(deadline));
        clock.advance_ns(1);
        assert!(clock.has_passed(deadline));
        assert_eq!(clock.now_ns(), 1_000);
    }

    #[test]
    fn test_zero_timeout_is_already_due() {
        let clock = SimClock::new();
        assert!(clock.has_passed(clock.deadline_after_ns(0)));
    }

    #[test]
    fn test_saturates() {
        let mut clock = SimClock::new();
        clock.advance(Duration::MAX);
        assert_eq!(clock.now_ns(), u64::MAX);
        assert_eq!(clock.deadline_after_ns(5), u64::MAX);
    }
}
