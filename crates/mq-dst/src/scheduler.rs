//! Seeded cooperative scheduler for logical threads.

use crate::random::DeterministicRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    Continue,
    SwitchTo(usize),
}

pub struct Scheduler {
    rng: DeterministicRng,
    threads_count: usize,
    switch_probability: f64,
    current: usize,
}

impl Scheduler {
    pub fn new(rng: DeterministicRng, threads_count: usize, switch_probability: f64) -> Self {
        debug_assert!(threads_count > 0, "Scheduler needs at least one thread");
        Self {
            rng,
            threads_count,
            switch_probability,
            current: 0,
        }
    }

    pub fn threads_count(&self) -> usize {
        self.threads_count
    }

    pub fn current_thread(&self) -> usize {
        self.current
    }

    /// Stay on the current thread or switch to a random other one.
    pub fn decide(&mut self) -> ScheduleDecision {
        if self.threads_count < 2 || !self.rng.gen_bool(self.switch_probability) {
            return ScheduleDecision::Continue;
        }
        let next = self.other_thread();
        self.current = next;
        ScheduleDecision::SwitchTo(next)
    }

    /// Switch to a random thread other than the current one.
    pub fn force_switch(&mut self) -> usize {
        if self.threads_count > 1 {
            self.current = self.other_thread();
        }
        self.current
    }

    /// Switch to a random thread from `eligible`. Keeps the current
    /// thread when `eligible` is empty.
    pub fn pick(&mut self, eligible: &[usize]) -> usize {
        if let Some(&thread) = self.rng.choose(eligible) {
            debug_assert!(thread < self.threads_count);
            self.current = thread;
        }
        self.current
    }

    pub fn switch_to(&mut self, thread: usize) {
        debug_assert!(thread < self.threads_count, "Thread {} out of range", thread);
        self.current = thread;
    }

    fn other_thread(&mut self) -> usize {
        let offset = self.rng.gen_range(1..self.threads_count);
        (self.current + offset) % self.threads_count
    }
}
