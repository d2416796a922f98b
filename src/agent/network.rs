//! Instantiating and driving one agent.
//!
//! [`AgentNetwork::spawn`] validates a genotype, wires a channel per unit,
//! builds every actor and only then starts their threads, so a configuration
//! error never leaves a half-running agent behind. The cortex starts last and
//! immediately begins the first episode.
//!
//! Lifecycle calls (`backup`, `perturb`, `restore`, `reset`) must only be made
//! between episodes, i.e. after an `EpisodeComplete` and before `reactivate`.

use super::actuator::Actuator;
use super::cortex::Cortex;
use super::environment::EnvironmentRef;
use super::registry::Registry;
use super::sensor::Sensor;
use crate::config::Config;
use crate::error::{Result, RuntimeError};
use crate::genotype::{Body, Genotype, UnitId};
use crate::message::{CortexEvent, CortexMsg, CortexStatus, NeuronMsg, SubstrateMsg};
use crate::neural::{Neuron, WeightSet};
use crate::substrate::{DerivedSubstrate, Substrate};
use crate::tuning::Candidate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send>;

/// Handles to every actor of one running agent
pub struct AgentNetwork {
    genotype: Genotype,
    registry: Registry,
    cortex: Sender<CortexMsg>,
    threads: Vec<(String, JoinHandle<()>)>,
    candidates: Vec<Candidate>,
    stopped: bool,
}

impl AgentNetwork {
    /// Instantiate `genotype` and start its first episode.
    ///
    /// Episode notices arrive on the returned receiver.
    pub fn spawn(
        genotype: Genotype,
        environment: EnvironmentRef,
        config: &Config,
    ) -> Result<(Self, Receiver<CortexEvent>)> {
        genotype.validate()?;
        let mut seeds = match config.runtime.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ genotype.agent),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut registry = Registry::new();
        let (cortex_tx, cortex_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();

        let mut sensor_inboxes = Vec::with_capacity(genotype.sensors.len());
        for sensor in &genotype.sensors {
            let (tx, rx) = mpsc::channel();
            registry.register_sensor(sensor.id, tx)?;
            sensor_inboxes.push(rx);
        }
        let mut actuator_inboxes = Vec::with_capacity(genotype.actuators.len());
        for actuator in &genotype.actuators {
            let (tx, rx) = mpsc::channel();
            registry.register_actuator(actuator.id, tx)?;
            actuator_inboxes.push(rx);
        }

        let mut jobs: Vec<(String, Job)> = Vec::new();
        match &genotype.body {
            Body::Neural { neurons } => {
                let mut inboxes = Vec::with_capacity(neurons.len());
                for neuron in neurons {
                    let (tx, rx) = mpsc::channel::<NeuronMsg>();
                    registry.register_neuron(neuron.id, tx)?;
                    inboxes.push(rx);
                }
                for (gene, inbox) in neurons.iter().zip(inboxes) {
                    let outputs = gene
                        .outputs
                        .iter()
                        .map(|&to| registry.endpoint(gene.id, to))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    let recurrent = gene
                        .recurrent_outputs
                        .iter()
                        .map(|&to| registry.endpoint(gene.id, to))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    let neuron = Neuron::new(
                        gene.clone(),
                        outputs,
                        recurrent,
                        genotype.heredity,
                        config.runtime.sat_limit,
                        ChaCha8Rng::seed_from_u64(seeds.gen()),
                    );
                    let job: Job = Box::new(move || neuron.run(inbox));
                    jobs.push((gene.id.to_string(), job));
                }
            }
            Body::Substrate(gene) => {
                let (tx, inbox) = mpsc::channel::<SubstrateMsg>();
                registry.register_substrate(tx)?;
                let endpoints = genotype
                    .actuators
                    .iter()
                    .map(|a| registry.endpoint(UnitId::Substrate, a.id))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let substrate = Substrate::new(
                    gene,
                    &genotype.sensors,
                    &genotype.actuators,
                    endpoints,
                    genotype.heredity,
                    config,
                    ChaCha8Rng::seed_from_u64(seeds.gen()),
                )?;
                let job: Job = Box::new(move || substrate.run(inbox));
                jobs.push(("substrate".to_string(), job));
            }
        }

        for (gene, inbox) in genotype.sensors.iter().zip(sensor_inboxes) {
            let fanout = gene
                .fanout
                .iter()
                .map(|&to| registry.endpoint(gene.id, to))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let sensor = Sensor::new(gene, fanout, environment.clone());
            let job: Job = Box::new(move || sensor.run(inbox));
            jobs.push((gene.id.to_string(), job));
        }
        for (gene, inbox) in genotype.actuators.iter().zip(actuator_inboxes) {
            let actuator = Actuator::new(gene, cortex_tx.clone(), environment.clone());
            let job: Job = Box::new(move || actuator.run(inbox));
            jobs.push((gene.id.to_string(), job));
        }

        let cortex = Cortex::new(
            genotype.agent,
            genotype.op_mode,
            registry.sensors(),
            registry.actuators(),
            registry.units(),
            events_tx,
        );
        let job: Job = Box::new(move || cortex.run(cortex_rx));
        jobs.push(("cortex".to_string(), job));

        let candidates = genotype
            .tunable_neurons()
            .iter()
            .map(|n| Candidate {
                id: n.id,
                generation: n.generation,
                weights: n.weight_count(),
            })
            .collect();

        let mut network = Self {
            genotype,
            registry,
            cortex: cortex_tx,
            threads: Vec::with_capacity(jobs.len()),
            candidates,
            stopped: false,
        };
        for (name, job) in jobs {
            let spawned = thread::Builder::new()
                .name(format!("agent-{}-{}", network.genotype.agent, name))
                .spawn(job);
            match spawned {
                Ok(handle) => network.threads.push((name, handle)),
                Err(source) => {
                    // Whatever started must not outlive the failed instantiation
                    let _ = network.stop();
                    return Err(RuntimeError::Spawn { unit: name, source }.into());
                }
            }
        }
        log::info!(
            "agent {}: spawned {} units",
            network.genotype.agent,
            network.registry.len()
        );
        Ok((network, events_rx))
    }

    pub fn agent(&self) -> u64 {
        self.genotype.agent
    }

    pub fn generation(&self) -> u32 {
        self.genotype.generation
    }

    /// Units tuning may perturb: neurons, or a substrate's CPPN neurons
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn tunable_ids(&self) -> Vec<UnitId> {
        self.candidates.iter().map(|c| c.id).collect()
    }

    fn check_tunable(&self, id: UnitId) -> std::result::Result<(), RuntimeError> {
        if self.candidates.iter().any(|c| c.id == id) {
            Ok(())
        } else {
            Err(RuntimeError::UnknownUnit(id))
        }
    }

    fn send_neuron(&self, id: UnitId, msg: NeuronMsg) -> std::result::Result<(), RuntimeError> {
        let tx = self.registry.neuron(id).ok_or(RuntimeError::UnknownUnit(id))?;
        tx.send(msg).map_err(|_| RuntimeError::Disconnected(id.to_string()))
    }

    fn send_substrate(&self, msg: SubstrateMsg) -> std::result::Result<(), RuntimeError> {
        self.registry
            .substrate()
            .ok_or(RuntimeError::UnknownUnit(UnitId::Substrate))?
            .send(msg)
            .map_err(|_| RuntimeError::Disconnected(UnitId::Substrate.to_string()))
    }

    /// Snapshot the weights of `ids`. A substrate snapshots its whole CPPN.
    pub fn backup(&self, ids: &[UnitId]) -> std::result::Result<(), RuntimeError> {
        for &id in ids {
            self.check_tunable(id)?;
        }
        if self.registry.substrate().is_some() {
            return self.send_substrate(SubstrateMsg::Backup);
        }
        for &id in ids {
            self.send_neuron(id, NeuronMsg::Backup)?;
        }
        Ok(())
    }

    pub fn perturb(&self, targets: &[(UnitId, f64)]) -> std::result::Result<(), RuntimeError> {
        for &(id, _) in targets {
            self.check_tunable(id)?;
        }
        if self.registry.substrate().is_some() {
            return self.send_substrate(SubstrateMsg::Perturb {
                targets: targets.to_vec(),
            });
        }
        for &(id, spread) in targets {
            self.send_neuron(id, NeuronMsg::Perturb { spread })?;
        }
        Ok(())
    }

    /// Roll `ids` back to their last snapshot. A substrate rolls back its whole CPPN.
    pub fn restore(&self, ids: &[UnitId]) -> std::result::Result<(), RuntimeError> {
        for &id in ids {
            self.check_tunable(id)?;
        }
        if self.registry.substrate().is_some() {
            return self.send_substrate(SubstrateMsg::Restore);
        }
        for &id in ids {
            self.send_neuron(id, NeuronMsg::Restore)?;
        }
        Ok(())
    }

    /// Clear every unit's transient state.
    ///
    /// All units first flush and acknowledge; only once every acknowledgement
    /// is in do they resume, so no unit can see a signal left over from the
    /// previous episode.
    pub fn reset(&self) -> std::result::Result<(), RuntimeError> {
        let (ack_tx, ack_rx) = mpsc::channel();
        let mut expected = 0;
        for (id, tx) in self.registry.neurons() {
            tx.send(NeuronMsg::Prepare { ack: ack_tx.clone() })
                .map_err(|_| RuntimeError::Disconnected(id.to_string()))?;
            expected += 1;
        }
        if self.registry.substrate().is_some() {
            self.send_substrate(SubstrateMsg::Prepare { ack: ack_tx.clone() })?;
            expected += 1;
        }
        drop(ack_tx);

        for _ in 0..expected {
            ack_rx
                .recv()
                .map_err(|_| RuntimeError::Disconnected("reset acknowledgement".to_string()))?;
        }
        for (id, tx) in self.registry.neurons() {
            tx.send(NeuronMsg::Reset)
                .map_err(|_| RuntimeError::Disconnected(id.to_string()))?;
        }
        if self.registry.substrate().is_some() {
            self.send_substrate(SubstrateMsg::Reset)?;
        }
        log::debug!("agent {}: reset {} units", self.agent(), expected);
        Ok(())
    }

    /// Discard a substrate's derived connectivity; no-op for neural agents.
    pub fn reset_substrate(&self) -> std::result::Result<(), RuntimeError> {
        if self.registry.substrate().is_some() {
            self.send_substrate(SubstrateMsg::ResetSubstrate)?;
        }
        Ok(())
    }

    /// Start the next episode, keeping the current controller.
    pub fn reactivate(&self) -> std::result::Result<(), RuntimeError> {
        self.send_cortex(CortexMsg::Reactivate(None))
    }

    /// Start the next episode, reporting to `controller` from now on.
    pub fn reactivate_with(&self, controller: Sender<CortexEvent>) -> std::result::Result<(), RuntimeError> {
        self.send_cortex(CortexMsg::Reactivate(Some(controller)))
    }

    fn send_cortex(&self, msg: CortexMsg) -> std::result::Result<(), RuntimeError> {
        self.cortex
            .send(msg)
            .map_err(|_| RuntimeError::Disconnected("cortex".to_string()))
    }

    pub fn status(&self) -> std::result::Result<CortexStatus, RuntimeError> {
        let (tx, rx) = mpsc::channel();
        self.send_cortex(CortexMsg::Status(tx))?;
        rx.recv().map_err(|_| RuntimeError::Disconnected("cortex".to_string()))
    }

    /// Current weights of one tunable unit
    pub fn weights(&self, id: UnitId) -> std::result::Result<WeightSet, RuntimeError> {
        self.check_tunable(id)?;
        if self.registry.substrate().is_some() {
            let (tx, rx) = mpsc::channel();
            self.send_substrate(SubstrateMsg::Weights { id, reply: tx })?;
            return rx
                .recv()
                .map_err(|_| RuntimeError::Disconnected(UnitId::Substrate.to_string()))?
                .ok_or(RuntimeError::UnknownUnit(id));
        }
        let (tx, rx) = mpsc::channel();
        self.send_neuron(id, NeuronMsg::Weights(tx))?;
        rx.recv().map_err(|_| RuntimeError::Disconnected(id.to_string()))
    }

    /// A substrate's current connectivity, if derived
    pub fn derived(&self) -> std::result::Result<Option<DerivedSubstrate>, RuntimeError> {
        let (tx, rx) = mpsc::channel();
        self.send_substrate(SubstrateMsg::Derived(tx))?;
        rx.recv()
            .map_err(|_| RuntimeError::Disconnected(UnitId::Substrate.to_string()))
    }

    /// Genotype to pass on, with weights chosen by the agent's heredity.
    pub fn harvest(&self) -> std::result::Result<Genotype, RuntimeError> {
        let mut genotype = self.genotype.clone();
        match &mut genotype.body {
            Body::Neural { neurons } => {
                for gene in neurons.iter_mut() {
                    let (tx, rx) = mpsc::channel();
                    self.send_neuron(gene.id, NeuronMsg::Harvest(tx))?;
                    *gene = rx
                        .recv()
                        .map_err(|_| RuntimeError::Disconnected(gene.id.to_string()))?;
                }
            }
            Body::Substrate(substrate) => {
                let (tx, rx) = mpsc::channel();
                self.send_substrate(SubstrateMsg::Harvest(tx))?;
                substrate.cppn = rx
                    .recv()
                    .map_err(|_| RuntimeError::Disconnected(UnitId::Substrate.to_string()))?;
            }
        }
        Ok(genotype)
    }

    /// Stop every unit and join every thread.
    pub fn stop(&mut self) -> std::result::Result<(), RuntimeError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        let _ = self.cortex.send(CortexMsg::Stop);
        self.registry.stop_all();

        let mut result = Ok(());
        for (name, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("agent {}: {} panicked", self.genotype.agent, name);
                if result.is_ok() {
                    result = Err(RuntimeError::Panicked(name));
                }
            }
        }
        log::info!("agent {}: stopped", self.genotype.agent);
        result
    }
}

impl Drop for AgentNetwork {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
