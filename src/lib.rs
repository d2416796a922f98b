//! # TWEANN
//!
//! Concurrent execution substrate for topology and weight evolving neural
//! network agents.
//!
//! ## Features
//!
//! - **Actors**: every sensor, neuron, actuator and the cortex runs on its own
//!   thread and talks only by message passing
//! - **Plastic**: Hebbian, Oja and ABCN lifetime learning with neuromodulation
//! - **Indirect encoding**: HyperNEAT-style substrates whose weights are painted
//!   by a CPPN, with rayon-parallel derivation
//! - **Tunable**: backup/perturb/restore primitives and a local-search driver
//! - **Configurable**: YAML configuration files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use tweann::agent::{AgentNetwork, Environment, EnvironmentHost};
//! use tweann::message::{Feedback, HaltSignal};
//! use tweann::{Activation, Config, Genotype, Tuner, UnitId};
//!
//! struct Echo;
//!
//! impl Environment for Echo {
//!     fn sense(&mut self, _: UnitId, _: &str, vl: usize) -> Vec<f64> {
//!         vec![1.0; vl]
//!     }
//!     fn act(&mut self, _: UnitId, _: &str, output: &[f64]) -> Feedback {
//!         Feedback::new(output[0], HaltSignal::Goal)
//!     }
//! }
//!
//! let config = Config::default();
//! let mut rng = ChaCha8Rng::seed_from_u64(1);
//! let genotype = Genotype::dense(1, &[("in", 2)], &[4], &[("out", 1)], Activation::Tanh, &mut rng);
//!
//! let host = EnvironmentHost::spawn(Echo).unwrap();
//! let (network, events) = AgentNetwork::spawn(genotype, host.handle(), &config).unwrap();
//! let outcome = Tuner::from_config(&config).run(&network, &events).unwrap();
//! println!("best fitness: {}", outcome.best_fitness);
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod genotype;
pub mod message;
pub mod neural;
pub mod substrate;
pub mod tuning;

// Re-export main types
pub use agent::{AgentNetwork, Environment, EnvironmentHost};
pub use config::Config;
pub use error::{ConfigError, Error, Result, RuntimeError};
pub use genotype::{Genotype, Heredity, OpMode, UnitId};
pub use neural::{Activation, Aggregator, Plasticity};
pub use tuning::{Tuner, TuningDuration, TuningOutcome, TuningSelection};

use message::{Feedback, HaltSignal};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Constant input; every episode lasts `length` ticks
struct Treadmill {
    length: u64,
    acted: u64,
}

impl Environment for Treadmill {
    fn sense(&mut self, _sensor: UnitId, _name: &str, vl: usize) -> Vec<f64> {
        vec![0.5; vl]
    }

    fn act(&mut self, _actuator: UnitId, _name: &str, output: &[f64]) -> Feedback {
        self.acted += 1;
        let halt = if self.acted % self.length == 0 {
            HaltSignal::Timeout
        } else {
            HaltSignal::Continue
        };
        Feedback::new(output.iter().sum(), halt)
    }
}

/// Run `episodes` episodes of `ticks` ticks on a dense agent with `hidden`
/// neurons per layer.
pub fn benchmark(episodes: u32, ticks: u64, hidden: &[usize]) -> Result<BenchmarkResult> {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let genotype = Genotype::dense(0, &[("in", 4)], hidden, &[("out", 2)], Activation::Tanh, &mut rng);
    let units = genotype.tunable_neurons().len();

    let host = EnvironmentHost::spawn(Treadmill {
        length: ticks.max(1),
        acted: 0,
    })?;
    let start = Instant::now();
    let (mut network, events) = AgentNetwork::spawn(genotype, host.handle(), &Config::default())?;

    let mut total_ticks = 0;
    for episode in 0..episodes {
        if episode > 0 {
            network.reset()?;
            network.reactivate()?;
        }
        match events.recv() {
            Ok(message::CortexEvent::EpisodeComplete(summary)) => total_ticks += summary.cycles,
            _ => return Err(RuntimeError::Disconnected("cortex".to_string()).into()),
        }
    }
    network.stop()?;
    let elapsed = start.elapsed();

    Ok(BenchmarkResult {
        episodes,
        units,
        ticks: total_ticks,
        elapsed_secs: elapsed.as_secs_f64(),
        ticks_per_second: total_ticks as f64 / elapsed.as_secs_f64(),
    })
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub episodes: u32,
    pub units: usize,
    pub ticks: u64,
    pub elapsed_secs: f64,
    pub ticks_per_second: f64,
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Benchmark Results ===")?;
        writeln!(f, "Episodes: {}", self.episodes)?;
        writeln!(f, "Neurons: {}", self.units)?;
        writeln!(f, "Ticks: {}", self.ticks)?;
        writeln!(f, "Time: {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Speed: {:.1} ticks/s", self.ticks_per_second)?;
        Ok(())
    }
}
