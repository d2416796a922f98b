//! Messages exchanged between the actors of one agent.
//!
//! Every unit owns a single inbox. Units never share state; they hold cloned
//! `Sender`s to the inboxes they are wired to.

use crate::agent::cortex::CortexState;
use crate::genotype::{NeuronGene, OpMode, UnitId};
use crate::neural::WeightSet;
use crate::substrate::DerivedSubstrate;
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Halt tag an actuator attaches to its report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltSignal {
    Continue,
    /// Episode ends because the goal was achieved
    Goal,
    Failure,
    Timeout,
}

impl HaltSignal {
    pub fn is_continue(self) -> bool {
        matches!(self, HaltSignal::Continue)
    }
}

/// What the environment returns for one actuator action
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub fitness: Vec<f64>,
    pub halt: HaltSignal,
}

impl Feedback {
    pub fn new(fitness: f64, halt: HaltSignal) -> Self {
        Self {
            fitness: vec![fitness],
            halt,
        }
    }
}

/// Actuator -> cortex, once per tick
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorReport {
    pub from: UnitId,
    /// Tick the actuator believes it is reporting for (1-based)
    pub cycle: u64,
    pub fitness: Vec<f64>,
    pub halt: HaltSignal,
}

/// Completion notice sent to the controller when an episode halts
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub agent: u64,
    pub op_mode: OpMode,
    /// Elementwise sum over every tick since activation
    pub fitness: Vec<f64>,
    /// Ticks closed since activation, including the halting one
    pub cycles: u64,
    pub elapsed: Duration,
    pub goal_reached: bool,
}

impl EpisodeSummary {
    pub fn total_fitness(&self) -> f64 {
        self.fitness.iter().sum()
    }
}

/// Cortex -> controller
#[derive(Debug, Clone, PartialEq)]
pub enum CortexEvent {
    EpisodeComplete(EpisodeSummary),
    Terminated { agent: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CortexStatus {
    pub state: CortexState,
    pub cycles: u64,
    pub pending_reports: usize,
}

#[derive(Debug)]
pub enum CortexMsg {
    Report(ActuatorReport),
    /// Start a new episode; `Some` replaces the controller
    Reactivate(Option<Sender<CortexEvent>>),
    Status(Sender<CortexStatus>),
    Stop,
}

#[derive(Debug)]
pub enum SensorMsg {
    Sync { cycle: u64 },
    Stop,
}

#[derive(Debug)]
pub enum NeuronMsg {
    Forward { from: UnitId, signal: Vec<f64> },
    Backup,
    Perturb { spread: f64 },
    Restore,
    /// First half of a reset: flush buffers, acknowledge, then wait for `Reset`
    Prepare { ack: Sender<UnitId> },
    Reset,
    Weights(Sender<WeightSet>),
    Harvest(Sender<NeuronGene>),
    Stop,
}

#[derive(Debug)]
pub enum ActuatorMsg {
    Forward { from: UnitId, signal: Vec<f64> },
    /// Clear buffers and restart the cycle counter
    Rewind,
    Stop,
}

#[derive(Debug)]
pub enum SubstrateMsg {
    Forward { from: UnitId, signal: Vec<f64> },
    /// Snapshot CPPN weights and the derived substrate
    Backup,
    /// Perturb CPPN neurons; the derived substrate is discarded
    Perturb { targets: Vec<(UnitId, f64)> },
    /// Roll CPPN weights and the derived substrate back to the snapshot
    Restore,
    /// Discard the derived substrate so the next tick re-derives it
    ResetSubstrate,
    Prepare { ack: Sender<UnitId> },
    Reset,
    Weights {
        id: UnitId,
        reply: Sender<Option<WeightSet>>,
    },
    Derived(Sender<Option<DerivedSubstrate>>),
    Harvest(Sender<Vec<NeuronGene>>),
    Stop,
}

/// A destination for forwarded signals
#[derive(Debug, Clone)]
pub enum Endpoint {
    Neuron(UnitId, Sender<NeuronMsg>),
    Actuator(UnitId, Sender<ActuatorMsg>),
    Substrate(Sender<SubstrateMsg>),
}

impl Endpoint {
    pub fn id(&self) -> UnitId {
        match self {
            Endpoint::Neuron(id, _) | Endpoint::Actuator(id, _) => *id,
            Endpoint::Substrate(_) => UnitId::Substrate,
        }
    }

    /// Forward `signal`; returns false if the destination is gone.
    pub fn forward(&self, from: UnitId, signal: Vec<f64>) -> bool {
        match self {
            Endpoint::Neuron(_, tx) => tx.send(NeuronMsg::Forward { from, signal }).is_ok(),
            Endpoint::Actuator(_, tx) => tx.send(ActuatorMsg::Forward { from, signal }).is_ok(),
            Endpoint::Substrate(tx) => tx.send(SubstrateMsg::Forward { from, signal }).is_ok(),
        }
    }

    pub fn stop(&self) {
        let _ = match self {
            Endpoint::Neuron(_, tx) => tx.send(NeuronMsg::Stop).is_ok(),
            Endpoint::Actuator(_, tx) => tx.send(ActuatorMsg::Stop).is_ok(),
            Endpoint::Substrate(tx) => tx.send(SubstrateMsg::Stop).is_ok(),
        };
    }
}
