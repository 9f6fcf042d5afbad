//! dst-sweep: run the simulation harness over a range of seeds.
//!
//! # Usage
//!
//! ```bash
//! dst-sweep --seeds 200 --start-seed 1 --capacity 4 --producers 3 --consumers 2
//! RUST_LOG=mq_dst=debug dst-sweep --seeds 1 --start-seed 17
//! ```
//!
//! Prints one JSON object per seed to stdout and a summary line last.
//! Exits non-zero when any seed fails.

use std::process;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use mq_core::{BoundedQueuePropertyChecker, PropertyChecker};
use mq_dst::{DstHarness, FaultConfig, HarnessConfig};
use mq_queue::TrackedQueue;

const SEEDS_MAX: u64 = 1_000_000;

#[derive(Parser, Debug)]
#[command(name = "dst-sweep")]
#[command(about = "Deterministic simulation sweep over the bounded blocking queue")]
struct Cli {
    /// Number of seeds to run.
    #[arg(long, default_value_t = 100)]
    seeds: u64,

    /// First seed; later seeds count up from here.
    #[arg(long, default_value_t = 1)]
    start_seed: u64,

    #[arg(long)]
    capacity: Option<usize>,

    #[arg(long)]
    producers: Option<usize>,

    #[arg(long)]
    consumers: Option<usize>,

    /// Items per producer.
    #[arg(long)]
    items: Option<u64>,

    /// Start from the stress preset with aggressive faults.
    #[arg(long)]
    stress: bool,

    /// Disable fault injection.
    #[arg(long)]
    no_faults: bool,
}

impl Cli {
    fn harness_config(&self) -> HarnessConfig {
        let mut config = if self.stress {
            HarnessConfig::stress()
        } else {
            HarnessConfig::default()
        };
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(producers) = self.producers {
            config.producers = producers;
        }
        if let Some(consumers) = self.consumers {
            config.consumers = consumers;
        }
        if let Some(items) = self.items {
            config.items_per_producer = items;
        }
        if self.no_faults {
            config.fault_config = FaultConfig::none();
        }
        config
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.harness_config();
    if config.capacity == 0 {
        eprintln!("Error: --capacity must be at least 1");
        process::exit(2);
    }
    let seeds = cli.seeds.min(SEEDS_MAX);

    let mut failed = Vec::new();
    for seed in cli.start_seed..cli.start_seed.saturating_add(seeds) {
        let queue = match TrackedQueue::new(config.capacity) {
            Ok(queue) => queue,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(2);
            }
        };
        let result = DstHarness::new(seed, config.clone()).run(&queue);
        let checker = BoundedQueuePropertyChecker::new(&queue).with_seed(seed);
        let properties = checker.check_all();
        let passed = result.all_invariants_held && properties.iter().all(|p| p.holds);

        println!(
            "{}",
            json!({
                "seed": seed,
                "passed": passed,
                "harness": result,
                "properties": properties,
            })
        );
        if !passed {
            tracing::error!(seed, "{}", result.format());
            for property in properties.iter().filter(|p| !p.holds) {
                tracing::error!(seed, "{}", property);
            }
            failed.push(seed);
        }
    }

    println!(
        "{}",
        json!({
            "summary": true,
            "seeds": seeds,
            "failed": failed.len(),
            "failed_seeds": failed,
            "config": config,
        })
    );
    if !failed.is_empty() {
        process::exit(1);
    }
}
