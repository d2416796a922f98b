//! Sensor actor: on each sync, read the environment and fan the vector out.

use super::environment::EnvironmentRef;
use crate::genotype::{SensorGene, UnitId};
use crate::message::{Endpoint, SensorMsg};
use std::sync::mpsc::Receiver;

pub struct Sensor {
    id: UnitId,
    name: String,
    vl: usize,
    fanout: Vec<Endpoint>,
    environment: EnvironmentRef,
}

impl Sensor {
    pub fn new(gene: &SensorGene, fanout: Vec<Endpoint>, environment: EnvironmentRef) -> Self {
        Self {
            id: gene.id,
            name: gene.name.clone(),
            vl: gene.vl,
            fanout,
            environment,
        }
    }

    /// Sense once and forward; false if the environment is gone.
    pub fn sync(&self, cycle: u64) -> bool {
        let mut signal = match self.environment.sense(self.id, &self.name, self.vl) {
            Ok(signal) => signal,
            Err(e) => {
                log::error!("{}: {}", self.id, e);
                return false;
            }
        };
        if signal.len() != self.vl {
            log::warn!(
                "{}: environment returned {} values for a {}-wide sensor",
                self.id,
                signal.len(),
                self.vl
            );
            signal.resize(self.vl, 0.0);
        }
        log::trace!("{}: cycle {} sensed {:?}", self.id, cycle, signal);
        for endpoint in &self.fanout {
            if !endpoint.forward(self.id, signal.clone()) {
                log::debug!("{}: destination {} is gone", self.id, endpoint.id());
            }
        }
        true
    }

    pub fn run(self, inbox: Receiver<SensorMsg>) {
        while let Ok(msg) = inbox.recv() {
            match msg {
                SensorMsg::Sync { cycle } => {
                    if !self.sync(cycle) {
                        break;
                    }
                }
                SensorMsg::Stop => break,
            }
        }
        log::trace!("{}: stopped", self.id);
    }
}
