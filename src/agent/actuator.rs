//! Actuator actor: gather one tick's outputs, act, and report to the cortex.

use super::environment::EnvironmentRef;
use crate::genotype::{ActuatorGene, UnitId};
use crate::message::{ActuatorMsg, ActuatorReport, CortexMsg};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{Receiver, Sender};

pub struct Actuator {
    id: UnitId,
    name: String,
    vl: usize,
    fanin: Vec<UnitId>,
    pending: HashMap<UnitId, VecDeque<Vec<f64>>>,
    /// Ticks acted on since the last rewind
    cycle: u64,
    cortex: Sender<CortexMsg>,
    environment: EnvironmentRef,
}

impl Actuator {
    pub fn new(gene: &ActuatorGene, cortex: Sender<CortexMsg>, environment: EnvironmentRef) -> Self {
        Self {
            id: gene.id,
            name: gene.name.clone(),
            vl: gene.vl,
            fanin: gene.fanin.clone(),
            pending: HashMap::new(),
            cycle: 0,
            cortex,
            environment,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn receive(&mut self, from: UnitId, signal: Vec<f64>) {
        if !self.fanin.contains(&from) {
            log::warn!("{}: dropping signal from unexpected source {}", self.id, from);
            return;
        }
        self.pending.entry(from).or_default().push_back(signal);
        while self.ready() {
            self.act();
        }
    }

    fn ready(&self) -> bool {
        self.fanin
            .iter()
            .all(|id| self.pending.get(id).map_or(false, |q| !q.is_empty()))
    }

    fn act(&mut self) {
        let mut output = Vec::with_capacity(self.vl);
        for id in &self.fanin {
            if let Some(signal) = self.pending.get_mut(id).and_then(|q| q.pop_front()) {
                output.extend(signal);
            }
        }
        if output.len() != self.vl {
            log::warn!(
                "{}: gathered {} values for a {}-wide actuator",
                self.id,
                output.len(),
                self.vl
            );
            output.resize(self.vl, 0.0);
        }

        let feedback = match self.environment.act(self.id, &self.name, output) {
            Ok(feedback) => feedback,
            Err(e) => {
                log::error!("{}: {}", self.id, e);
                return;
            }
        };
        self.cycle += 1;
        let report = ActuatorReport {
            from: self.id,
            cycle: self.cycle,
            fitness: feedback.fitness,
            halt: feedback.halt,
        };
        if self.cortex.send(CortexMsg::Report(report)).is_err() {
            log::debug!("{}: cortex is gone", self.id);
        }
    }

    /// Drop buffered signals and restart the cycle count.
    pub fn rewind(&mut self) {
        self.pending.clear();
        self.cycle = 0;
    }

    pub fn run(mut self, inbox: Receiver<ActuatorMsg>) {
        while let Ok(msg) = inbox.recv() {
            match msg {
                ActuatorMsg::Forward { from, signal } => self.receive(from, signal),
                ActuatorMsg::Rewind => self.rewind(),
                ActuatorMsg::Stop => break,
            }
        }
        log::trace!("{}: stopped after {} cycles", self.id, self.cycle);
    }
}
