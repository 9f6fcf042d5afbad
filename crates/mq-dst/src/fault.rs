//! Deterministic fault injection.

use serde::{Deserialize, Serialize};

use crate::random::DeterministicRng;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Probability that a fault point fires.
    pub fault_probability: f64,
    /// Probability of a simulated delay at a delay point.
    pub delay_probability: f64,
    pub max_delay_ns: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            fault_probability: 0.02,
            delay_probability: 0.05,
            max_delay_ns: 1_000_000,
        }
    }
}

impl FaultConfig {
    pub fn none() -> Self {
        Self {
            fault_probability: 0.0,
            delay_probability: 0.0,
            max_delay_ns: 0,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            fault_probability: 0.1,
            delay_probability: 0.2,
            max_delay_ns: 10_000_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FaultStats {
    pub checks_count: u64,
    pub faults_count: u64,
    pub delays_count: u64,
    pub total_delay_ns: u64,
}

pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    pub fn should_fail(&mut self) -> bool {
        self.stats.checks_count += 1;
        let fail = self.rng.gen_bool(self.config.fault_probability);
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// Simulated delay to apply, if one fires.
    pub fn maybe_delay_ns(&mut self) -> Option<u64> {
        if self.config.max_delay_ns == 0 || !self.rng.gen_bool(self.config.delay_probability) {
            return None;
        }
        let delay = self.rng.gen_range(1..=self.config.max_delay_ns);
        self.stats.delays_count += 1;
        self.stats.total_delay_ns += delay;
        Some(delay)
    }

    /// Pick one of `choices` uniformly.
    pub fn pick<T: Copy>(&mut self, choices: &[T]) -> Option<T> {
        self.rng.choose(choices).copied()
    }

    pub fn stats(&self) -> &FaultStats {
        &self.stats
    }
}
