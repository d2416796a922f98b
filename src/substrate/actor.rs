//! Substrate actor.
//!
//! Stands in for the whole neuron graph of a substrate agent: it collects one
//! vector per sensor, propagates it through the derived connectivity and hands
//! each actuator its slice of the output plane.

use super::connectivity::{Activity, Geometry};
use super::{CepParams, Cppn, DerivedSubstrate, Layout, PlasticityMode, SubstrateGene};
use crate::config::Config;
use crate::error::ConfigError;
use crate::genotype::{ActuatorGene, Heredity, SensorGene, UnitId};
use crate::message::{Endpoint, SubstrateMsg};
use crate::neural::{Flow, WeightSet};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::mpsc::Receiver;

type Snapshot = (Vec<WeightSet>, Option<DerivedSubstrate>);

pub struct Substrate {
    sensors: Vec<(UnitId, usize)>,
    pending: HashMap<UnitId, VecDeque<Vec<f64>>>,
    actuators: Vec<(Range<usize>, Endpoint)>,
    geometry: Geometry,
    mode: PlasticityMode,
    cppn: Cppn,
    derived: Option<DerivedSubstrate>,
    previous: Option<Activity>,
    backup: Option<Snapshot>,
    heredity: Heredity,
    sat_limit: f64,
    rng: ChaCha8Rng,
    ticks: u64,
}

impl Substrate {
    /// `endpoints` must follow the order of `actuators`.
    pub fn new(
        gene: &SubstrateGene,
        sensors: &[SensorGene],
        actuators: &[ActuatorGene],
        endpoints: Vec<Endpoint>,
        heredity: Heredity,
        config: &Config,
        rng: ChaCha8Rng,
    ) -> Result<Self, ConfigError> {
        let cppn = Cppn::compile(&gene.cppn, &gene.cppn_outputs, gene.cppn_input_width())?;
        let layout = Layout::build(sensors, actuators, gene.density);
        let ranges: Vec<Range<usize>> = layout.outputs.iter().map(|(_, r)| r.clone()).collect();
        if ranges.len() != endpoints.len() {
            return Err(ConfigError::Substrate(format!(
                "{} actuators but {} endpoints",
                ranges.len(),
                endpoints.len()
            )));
        }

        Ok(Self {
            sensors: sensors.iter().map(|s| (s.id, s.vl)).collect(),
            pending: HashMap::new(),
            actuators: ranges.into_iter().zip(endpoints).collect(),
            geometry: Geometry {
                layout,
                topology: gene.topology,
                encoding: gene.encoding,
                expression: gene.expression,
                params: CepParams::from(&config.substrate),
            },
            mode: gene.plasticity,
            cppn,
            derived: None,
            previous: None,
            backup: None,
            heredity,
            sat_limit: config.runtime.sat_limit,
            rng,
            ticks: 0,
        })
    }

    pub fn derived(&self) -> Option<&DerivedSubstrate> {
        self.derived.as_ref()
    }

    /// Snapshot CPPN weights together with the connectivity they expressed.
    pub fn backup_substrate(&mut self) {
        self.backup = Some((self.cppn.snapshot(), self.derived.clone()));
    }

    /// Forget the derived connectivity; the next tick derives it again.
    pub fn reset_substrate(&mut self) {
        self.derived = None;
        self.previous = None;
    }

    /// Roll CPPN weights and connectivity back to the snapshot; no-op without one.
    pub fn revert_substrate(&mut self) {
        match &self.backup {
            Some((weights, derived)) => {
                self.cppn.restore(weights);
                self.derived = derived.clone();
                self.previous = None;
            }
            None => log::debug!("substrate: revert requested without a backup"),
        }
    }

    pub fn perturb(&mut self, targets: &[(UnitId, f64)]) {
        for &(id, spread) in targets {
            if !self.cppn.perturb(id, spread, self.sat_limit, &mut self.rng) {
                log::warn!("substrate: {} is not a CPPN neuron", id);
            }
        }
        self.reset_substrate();
    }

    /// Drop buffered input and activity. Plastic connectivity is discarded too
    /// so every episode starts from the expressed weights.
    pub fn flush(&mut self) {
        self.pending.clear();
        self.previous = None;
        if self.mode != PlasticityMode::None {
            self.derived = None;
        }
    }

    pub fn receive(&mut self, from: UnitId, signal: Vec<f64>) {
        match self.sensors.iter().find(|(id, _)| *id == from) {
            None => log::warn!("substrate: dropping signal from unexpected source {}", from),
            Some((_, vl)) if *vl != signal.len() => log::warn!(
                "substrate: dropping signal from {} with length {} (expected {})",
                from,
                signal.len(),
                vl
            ),
            Some(_) => {
                self.pending.entry(from).or_default().push_back(signal);
                while self.ready() {
                    self.fire();
                }
            }
        }
    }

    fn ready(&self) -> bool {
        self.sensors
            .iter()
            .all(|(id, _)| self.pending.get(id).map_or(false, |q| !q.is_empty()))
    }

    fn fire(&mut self) {
        let mut input = Vec::new();
        for (id, _) in &self.sensors {
            if let Some(signal) = self.pending.get_mut(id).and_then(|q| q.pop_front()) {
                input.extend(signal);
            }
        }

        let derived = self
            .derived
            .get_or_insert_with(|| self.geometry.derive(&self.cppn));
        let previous = self.previous.take().unwrap_or_else(|| derived.rest());
        let activity = derived.propagate(&input, &previous);

        let output = derived.output(&activity);
        for (range, endpoint) in &self.actuators {
            if !endpoint.forward(UnitId::Substrate, output[range.clone()].to_vec()) {
                log::debug!("substrate: destination {} is gone", endpoint.id());
            }
        }

        match self.mode {
            PlasticityMode::None => {}
            PlasticityMode::Abcn => derived.learn_abcn(&activity, &previous, self.geometry.params.sat_limit),
            PlasticityMode::Iterative => self.geometry.iterate(derived, &self.cppn, &activity, &previous),
        }

        self.previous = Some(activity);
        self.ticks += 1;
        log::trace!("substrate: tick {}", self.ticks);
    }

    pub fn handle(&mut self, msg: SubstrateMsg) -> Flow {
        match msg {
            SubstrateMsg::Forward { from, signal } => self.receive(from, signal),
            SubstrateMsg::Backup => self.backup_substrate(),
            SubstrateMsg::Perturb { targets } => self.perturb(&targets),
            SubstrateMsg::Restore => self.revert_substrate(),
            SubstrateMsg::ResetSubstrate => self.reset_substrate(),
            SubstrateMsg::Prepare { ack } => {
                self.flush();
                let _ = ack.send(UnitId::Substrate);
                return Flow::AwaitReset;
            }
            SubstrateMsg::Reset => self.flush(),
            SubstrateMsg::Weights { id, reply } => {
                let _ = reply.send(self.cppn.weights(id));
            }
            SubstrateMsg::Derived(reply) => {
                let _ = reply.send(self.derived.clone());
            }
            SubstrateMsg::Harvest(reply) => {
                let _ = reply.send(self.cppn.harvest(self.heredity));
            }
            SubstrateMsg::Stop => return Flow::Stop,
        }
        Flow::Continue
    }

    pub fn run(mut self, inbox: Receiver<SubstrateMsg>) {
        log::trace!("substrate: started");
        while let Ok(msg) = inbox.recv() {
            match self.handle(msg) {
                Flow::Continue => {}
                Flow::Stop => break,
                Flow::AwaitReset => {
                    if !self.await_reset(&inbox) {
                        break;
                    }
                }
            }
        }
        log::trace!("substrate: stopped after {} ticks", self.ticks);
    }

    fn await_reset(&mut self, inbox: &Receiver<SubstrateMsg>) -> bool {
        while let Ok(msg) = inbox.recv() {
            match msg {
                SubstrateMsg::Reset => {
                    self.flush();
                    return true;
                }
                SubstrateMsg::Forward { from, .. } => {
                    log::debug!("substrate: discarding signal from {} while resetting", from);
                }
                other => {
                    if self.handle(other) == Flow::Stop {
                        return false;
                    }
                }
            }
        }
        false
    }
}
