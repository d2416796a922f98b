//! The local-search loop run on a live agent between structural mutations.
//!
//! Each attempt evaluates one episode. An improvement becomes the new
//! baseline (`backup`), and the network is rolled back to the baseline
//! (`restore`) before the next attempt. The phase
//! ends when the attempt budget is spent without an improvement, or when an
//! improving episode reached the goal.

use super::duration::TuningDuration;
use super::selection::TuningSelection;
use crate::agent::AgentNetwork;
use crate::config::{Config, TuningConfig};
use crate::error::RuntimeError;
use crate::message::{CortexEvent, EpisodeSummary};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

/// Result of one tuning phase
#[derive(Debug, Clone, PartialEq)]
pub struct TuningOutcome {
    /// Fitness of the episode that was already running when tuning began
    pub initial_fitness: f64,
    pub best_fitness: f64,
    /// Episodes evaluated, including the initial one
    pub evaluations: u32,
    /// Ticks across every evaluated episode
    pub cycles: u64,
    /// Consecutive non-improving attempts allowed
    pub budget: u32,
    pub goal_reached: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Tuner {
    selection: TuningSelection,
    selection_parameter: f64,
    duration: TuningDuration,
    duration_parameter: f64,
    perturbation_range: f64,
    max_attempts_cap: u32,
    seed: Option<u64>,
}

impl Tuner {
    pub fn new(tuning: &TuningConfig, seed: Option<u64>) -> Self {
        Self {
            selection: tuning.selection,
            selection_parameter: tuning.selection_parameter,
            duration: tuning.duration,
            duration_parameter: tuning.duration_parameter,
            perturbation_range: tuning.perturbation_range,
            max_attempts_cap: tuning.max_attempts_cap,
            seed,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.tuning, config.runtime.seed)
    }

    /// Attempt budget for `network`, capped by `max_attempts_cap`.
    pub fn budget(&self, network: &AgentNetwork) -> u32 {
        self.duration
            .attempts(self.duration_parameter, network.candidates(), network.generation())
            .min(self.max_attempts_cap)
    }

    /// Tune `network`, whose current episode reports on `events`.
    ///
    /// On return the network holds the best weights found, its cortex is
    /// inactive, and the next episode has not been started.
    pub fn run(
        &self,
        network: &AgentNetwork,
        events: &Receiver<CortexEvent>,
    ) -> Result<TuningOutcome, RuntimeError> {
        let started = Instant::now();
        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ network.agent().rotate_left(17)),
            None => ChaCha8Rng::from_entropy(),
        };
        let ids = network.tunable_ids();
        let budget = self.budget(network);

        let mut initial = None;
        let mut best = f64::NEG_INFINITY;
        let mut evaluations = 0u32;
        let mut cycles = 0u64;
        let mut attempts = 0u32;
        let mut goal_reached = false;

        loop {
            let summary = next_episode(events)?;
            let fitness = summary.total_fitness();
            evaluations += 1;
            cycles += summary.cycles;
            initial.get_or_insert(fitness);

            if fitness > best {
                log::debug!(
                    "agent {}: attempt {} improved {:.6} -> {:.6}",
                    network.agent(),
                    evaluations,
                    best,
                    fitness
                );
                best = fitness;
                attempts = 0;
                network.backup(&ids)?;
                goal_reached = summary.goal_reached;
            } else {
                attempts += 1;
            }
            // Plastic units learned during the episode; every attempt starts
            // from the best weights
            network.restore(&ids)?;
            if goal_reached || attempts >= budget {
                break;
            }

            let targets = self.selection.select(
                network.candidates(),
                network.generation(),
                self.selection_parameter,
                self.perturbation_range,
                &mut rng,
            );
            network.perturb(&targets)?;
            network.reset()?;
            network.reactivate()?;
        }

        let outcome = TuningOutcome {
            initial_fitness: initial.unwrap_or(best),
            best_fitness: best,
            evaluations,
            cycles,
            budget,
            goal_reached,
            elapsed: started.elapsed(),
        };
        log::info!(
            "agent {}: tuned {:.6} -> {:.6} in {} evaluations",
            network.agent(),
            outcome.initial_fitness,
            outcome.best_fitness,
            outcome.evaluations
        );
        Ok(outcome)
    }
}

fn next_episode(events: &Receiver<CortexEvent>) -> Result<EpisodeSummary, RuntimeError> {
    match events.recv() {
        Ok(CortexEvent::EpisodeComplete(summary)) => Ok(summary),
        Ok(CortexEvent::Terminated { .. }) | Err(_) => {
            Err(RuntimeError::Disconnected("cortex".to_string()))
        }
    }
}
