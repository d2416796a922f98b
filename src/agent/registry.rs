//! Per-agent lookup of actor inboxes.
//!
//! Built by the instantiator while wiring an agent and owned by its
//! [`AgentNetwork`](super::AgentNetwork); there is no process-wide registry.

use crate::error::ConfigError;
use crate::genotype::UnitId;
use crate::message::{ActuatorMsg, Endpoint, NeuronMsg, SensorMsg, SubstrateMsg};
use std::collections::BTreeMap;
use std::sync::mpsc::Sender;

#[derive(Debug, Default)]
pub struct Registry {
    sensors: BTreeMap<UnitId, Sender<SensorMsg>>,
    neurons: BTreeMap<UnitId, Sender<NeuronMsg>>,
    actuators: BTreeMap<UnitId, Sender<ActuatorMsg>>,
    substrate: Option<Sender<SubstrateMsg>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, id: UnitId) -> bool {
        self.sensors.contains_key(&id)
            || self.neurons.contains_key(&id)
            || self.actuators.contains_key(&id)
            || (id == UnitId::Substrate && self.substrate.is_some())
    }

    fn vacant(&self, id: UnitId) -> Result<(), ConfigError> {
        if self.contains(id) {
            Err(ConfigError::DuplicateUnit(id))
        } else {
            Ok(())
        }
    }

    pub fn register_sensor(&mut self, id: UnitId, tx: Sender<SensorMsg>) -> Result<(), ConfigError> {
        self.vacant(id)?;
        self.sensors.insert(id, tx);
        Ok(())
    }

    pub fn register_neuron(&mut self, id: UnitId, tx: Sender<NeuronMsg>) -> Result<(), ConfigError> {
        self.vacant(id)?;
        self.neurons.insert(id, tx);
        Ok(())
    }

    pub fn register_actuator(&mut self, id: UnitId, tx: Sender<ActuatorMsg>) -> Result<(), ConfigError> {
        self.vacant(id)?;
        self.actuators.insert(id, tx);
        Ok(())
    }

    pub fn register_substrate(&mut self, tx: Sender<SubstrateMsg>) -> Result<(), ConfigError> {
        self.vacant(UnitId::Substrate)?;
        self.substrate = Some(tx);
        Ok(())
    }

    /// Destination `to`, as seen from `from`, for forwarded signals
    pub fn endpoint(&self, from: UnitId, to: UnitId) -> Result<Endpoint, ConfigError> {
        let found = match to {
            UnitId::Neuron(_) => self.neurons.get(&to).map(|tx| Endpoint::Neuron(to, tx.clone())),
            UnitId::Actuator(_) => self
                .actuators
                .get(&to)
                .map(|tx| Endpoint::Actuator(to, tx.clone())),
            UnitId::Substrate => self.substrate.as_ref().map(|tx| Endpoint::Substrate(tx.clone())),
            UnitId::Sensor(_) | UnitId::Cpp => None,
        };
        found.ok_or(ConfigError::DanglingReference {
            unit: from,
            missing: to,
        })
    }

    pub fn neuron(&self, id: UnitId) -> Option<&Sender<NeuronMsg>> {
        self.neurons.get(&id)
    }

    pub fn neurons(&self) -> impl Iterator<Item = (UnitId, &Sender<NeuronMsg>)> {
        self.neurons.iter().map(|(id, tx)| (*id, tx))
    }

    pub fn substrate(&self) -> Option<&Sender<SubstrateMsg>> {
        self.substrate.as_ref()
    }

    pub fn sensors(&self) -> Vec<(UnitId, Sender<SensorMsg>)> {
        self.sensors.iter().map(|(id, tx)| (*id, tx.clone())).collect()
    }

    pub fn actuators(&self) -> Vec<(UnitId, Sender<ActuatorMsg>)> {
        self.actuators.iter().map(|(id, tx)| (*id, tx.clone())).collect()
    }

    /// Everything between sensors and actuators
    pub fn units(&self) -> Vec<Endpoint> {
        self.neurons
            .iter()
            .map(|(id, tx)| Endpoint::Neuron(*id, tx.clone()))
            .chain(self.substrate.iter().map(|tx| Endpoint::Substrate(tx.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.len() + self.neurons.len() + self.actuators.len() + usize::from(self.substrate.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `Stop` to every registered unit.
    pub fn stop_all(&self) {
        for tx in self.sensors.values() {
            let _ = tx.send(SensorMsg::Stop);
        }
        for unit in self.units() {
            unit.stop();
        }
        for tx in self.actuators.values() {
            let _ = tx.send(ActuatorMsg::Stop);
        }
    }
}
