//! The simulation environment: clock, randomness, faults and scheduling,
//! all derived from one seed.

use crate::clock::SimClock;
use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;
use crate::scheduler::Scheduler;

pub struct DstEnv {
    seed: u64,
    clock: SimClock,
    rng: DeterministicRng,
    fault: FaultInjector,
    scheduler: Option<Scheduler>,
}

impl DstEnv {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, FaultConfig::default())
    }

    #[must_use]
    pub fn with_faults(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            seed,
            clock: SimClock::new(),
            rng: DeterministicRng::new(seed),
            fault: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), fault_config),
            scheduler: None,
        }
    }

    #[must_use]
    pub fn with_scheduler(seed: u64, threads_count: usize) -> Self {
        Self::with_scheduler_and_faults(seed, threads_count, 0.2, FaultConfig::default())
    }

    #[must_use]
    pub fn with_scheduler_and_faults(
        seed: u64,
        threads_count: usize,
        switch_probability: f64,
        fault_config: FaultConfig,
    ) -> Self {
        let mut env = Self::with_faults(seed, fault_config);
        env.scheduler = Some(Scheduler::new(
            DeterministicRng::new(seed.wrapping_add(2)),
            threads_count,
            switch_probability,
        ));
        env
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn clock(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    pub fn scheduler(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    /// Advance the clock by an injected delay, if one fires.
    pub fn maybe_delay(&mut self) -> u64 {
        match self.fault.maybe_delay_ns() {
            Some(ns) => {
                self.clock.advance_ns(ns);
                ns
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ScheduleDecision;

    #[test]
    fn test_env_is_reproducible() {
        let trace = |seed| {
            let mut env = DstEnv::with_scheduler_and_faults(seed, 4, 0.5, FaultConfig::aggressive());
            let mut out = Vec::new();
            for _ in 0..100 {
                out.push(env.rng().gen_range(0..1000u64));
                out.push(env.maybe_delay());
                out.push(match env.scheduler().map(|s| s.decide()) {
                    Some(ScheduleDecision::SwitchTo(t)) => t as u64 + 1,
                    _ => 0,
                });
            }
            (out, env.now_ns())
        };
        assert_eq!(trace(77), trace(77));
    }

    #[test]
    fn test_plain_env_has_no_scheduler() {
        let mut env = DstEnv::new(3);
        assert!(env.scheduler().is_none());
        env.clock().advance_ns(10);
        assert_eq!(env.now_ns(), 10);
        assert_eq!(env.seed(), 3);
    }
}
