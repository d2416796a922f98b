//! Neuron actor.
//!
//! A neuron buffers incoming signals per source, and once every required source
//! has delivered for the current tick it aggregates, activates and forwards the
//! result. Recurrent sources are exempt on the first tick after a reset; their
//! slot reads as zeros. Weight lifecycle operations (backup, perturb, restore)
//! arrive on the same inbox and therefore never interleave with a tick.

use super::aggregator::{dot_product, AggregatorMemory};
use super::{Activation, Aggregator, Plasticity};
use crate::genotype::{Heredity, InputGene, NeuronGene, UnitId};
use crate::message::{Endpoint, NeuronMsg};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Receiver;

/// Snapshot of every tunable weight of one neuron
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSet {
    pub inputs: Vec<Vec<f64>>,
    pub modulatory: Vec<Vec<f64>>,
    pub bias: Option<f64>,
}

impl WeightSet {
    pub fn from_gene(gene: &NeuronGene) -> Self {
        let values = |inputs: &[InputGene]| -> Vec<Vec<f64>> {
            inputs
                .iter()
                .map(|i| i.weights.iter().map(|w| w.value).collect())
                .collect()
        };
        Self {
            inputs: values(&gene.inputs),
            modulatory: values(&gene.modulatory),
            bias: gene.bias.as_ref().map(|b| b.value),
        }
    }

    /// Every weight in a fixed order
    pub fn flatten(&self) -> Vec<f64> {
        self.inputs
            .iter()
            .chain(self.modulatory.iter())
            .flatten()
            .copied()
            .chain(self.bias)
            .collect()
    }

    /// Write these values back into `gene`
    pub fn write_to(&self, gene: &mut NeuronGene) {
        for (input, values) in gene.inputs.iter_mut().zip(&self.inputs) {
            for (w, v) in input.weights.iter_mut().zip(values) {
                w.value = *v;
            }
        }
        for (input, values) in gene.modulatory.iter_mut().zip(&self.modulatory) {
            for (w, v) in input.weights.iter_mut().zip(values) {
                w.value = *v;
            }
        }
        if let (Some(bias), Some(v)) = (gene.bias.as_mut(), self.bias) {
            bias.value = v;
        }
    }

    /// Add uniform noise in `[-spread/2, spread/2]` to every weight.
    pub fn perturb<R: Rng>(&mut self, spread: f64, sat_limit: f64, rng: &mut R) {
        let mut jitter = |w: &mut f64| {
            *w = saturate(*w + (rng.gen::<f64>() - 0.5) * spread, sat_limit);
        };
        for weights in self.inputs.iter_mut().chain(self.modulatory.iter_mut()) {
            weights.iter_mut().for_each(&mut jitter);
        }
        if let Some(bias) = self.bias.as_mut() {
            jitter(bias);
        }
    }
}

#[inline]
pub(crate) fn saturate(value: f64, limit: f64) -> f64 {
    value.clamp(-limit, limit)
}

#[derive(Debug, Clone)]
struct Synapse {
    source: UnitId,
    recurrent: bool,
    params: Vec<Vec<f64>>,
}

/// What the actor loop does after handling a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Buffers flushed and acknowledged; block until `Reset`
    AwaitReset,
    Stop,
}

pub struct Neuron {
    id: UnitId,
    activation: Activation,
    aggregation: Aggregator,
    plasticity: Plasticity,
    inputs: Vec<Synapse>,
    modulatory: Vec<Synapse>,
    bias_params: Vec<f64>,
    weights: WeightSet,
    backup: Option<WeightSet>,
    /// Weights the current episode started from, kept for plastic neurons
    start: Option<WeightSet>,
    outputs: Vec<Endpoint>,
    recurrent_outputs: Vec<Endpoint>,
    pending: HashMap<UnitId, VecDeque<Vec<f64>>>,
    /// No tick completed since the last reset
    fresh: bool,
    memory: AggregatorMemory,
    gene: NeuronGene,
    heredity: Heredity,
    sat_limit: f64,
    rng: ChaCha8Rng,
    ticks: u64,
}

impl Neuron {
    pub fn new(
        gene: NeuronGene,
        outputs: Vec<Endpoint>,
        recurrent_outputs: Vec<Endpoint>,
        heredity: Heredity,
        sat_limit: f64,
        rng: ChaCha8Rng,
    ) -> Self {
        let synapses = |inputs: &[InputGene]| -> Vec<Synapse> {
            inputs
                .iter()
                .map(|i| Synapse {
                    source: i.source,
                    recurrent: i.recurrent,
                    params: i.weights.iter().map(|w| w.params.clone()).collect(),
                })
                .collect()
        };
        Self {
            id: gene.id,
            activation: gene.activation,
            aggregation: gene.aggregation,
            plasticity: gene.plasticity,
            inputs: synapses(&gene.inputs),
            modulatory: synapses(&gene.modulatory),
            bias_params: gene.bias.as_ref().map(|b| b.params.clone()).unwrap_or_default(),
            weights: WeightSet::from_gene(&gene),
            backup: None,
            start: None,
            outputs,
            recurrent_outputs,
            pending: HashMap::new(),
            fresh: true,
            memory: AggregatorMemory::default(),
            gene,
            heredity,
            sat_limit,
            rng,
            ticks: 0,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn weights(&self) -> &WeightSet {
        &self.weights
    }

    /// Snapshot the weights, replacing any earlier snapshot.
    ///
    /// A plastic neuron snapshots the weights its current episode started
    /// from, so a restore replays the episode that was scored rather than
    /// continuing from what it learned.
    pub fn backup(&mut self) {
        let snapshot = match (&self.start, self.plasticity.is_enabled()) {
            (Some(start), true) => start.clone(),
            _ => self.weights.clone(),
        };
        self.backup = Some(snapshot);
    }

    pub fn perturb(&mut self, spread: f64) {
        self.weights.perturb(spread, self.sat_limit, &mut self.rng);
    }

    /// Overwrite current weights with the snapshot; no-op without one.
    pub fn restore(&mut self) {
        match &self.backup {
            Some(backup) => self.weights = backup.clone(),
            None => log::debug!("{}: restore requested without a backup", self.id),
        }
    }

    /// Drop transient tick state; weights are untouched.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.memory.clear();
        self.fresh = true;
        self.start = None;
    }

    /// Gene to pass on to offspring, according to heredity
    pub fn harvest(&self) -> NeuronGene {
        let mut gene = self.gene.clone();
        if self.heredity == Heredity::Lamarckian {
            self.weights.write_to(&mut gene);
        }
        gene
    }

    /// Buffer one signal and fire as many ticks as have become complete.
    pub fn receive(&mut self, from: UnitId, signal: Vec<f64>) {
        let expected = self
            .inputs
            .iter()
            .zip(&self.weights.inputs)
            .chain(self.modulatory.iter().zip(&self.weights.modulatory))
            .find(|(s, _)| s.source == from)
            .map(|(_, w)| w.len());

        match expected {
            None => {
                log::warn!("{}: dropping signal from unexpected source {}", self.id, from);
            }
            Some(len) if len != signal.len() => {
                log::warn!(
                    "{}: dropping signal from {} with length {} (expected {})",
                    self.id,
                    from,
                    signal.len(),
                    len
                );
            }
            Some(_) => {
                self.pending.entry(from).or_default().push_back(signal);
                while self.ready() {
                    self.fire();
                }
            }
        }
    }

    fn ready(&self) -> bool {
        self.inputs
            .iter()
            .chain(self.modulatory.iter())
            .all(|s| {
                (s.recurrent && self.fresh)
                    || self.pending.get(&s.source).map_or(false, |q| !q.is_empty())
            })
    }

    fn take(&mut self, synapse: usize, modulatory: bool) -> Vec<f64> {
        let (s, len) = if modulatory {
            (&self.modulatory[synapse], self.weights.modulatory[synapse].len())
        } else {
            (&self.inputs[synapse], self.weights.inputs[synapse].len())
        };
        if s.recurrent && self.fresh {
            return vec![0.0; len];
        }
        let source = s.source;
        self.pending
            .get_mut(&source)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| vec![0.0; len])
    }

    fn fire(&mut self) {
        let signals: Vec<Vec<f64>> = (0..self.inputs.len()).map(|i| self.take(i, false)).collect();
        let mod_signals: Vec<Vec<f64>> =
            (0..self.modulatory.len()).map(|i| self.take(i, true)).collect();

        let pairs: Vec<(&[f64], &[f64])> = signals
            .iter()
            .zip(&self.weights.inputs)
            .map(|(s, w)| (s.as_slice(), w.as_slice()))
            .collect();
        let aggregate = self.aggregation.apply(&pairs, self.weights.bias, &mut self.memory);
        let output = self.activation.apply(aggregate);

        // Recurrent destinations first so they are enqueued before anything the
        // forward path causes downstream.
        for endpoint in self.recurrent_outputs.iter().chain(self.outputs.iter()) {
            if !endpoint.forward(self.id, vec![output]) {
                log::debug!("{}: destination {} is gone", self.id, endpoint.id());
            }
        }

        if self.plasticity.is_enabled() {
            if self.fresh {
                self.start = Some(self.weights.clone());
            }
            self.learn(&signals, &mod_signals, output);
        }

        self.fresh = false;
        self.ticks += 1;
        log::trace!("{}: tick {} output {:.4}", self.id, self.ticks, output);
    }

    fn learn(&mut self, signals: &[Vec<f64>], mod_signals: &[Vec<f64>], output: f64) {
        let modulation = if self.modulatory.is_empty() {
            1.0
        } else {
            let pairs: Vec<(&[f64], &[f64])> = mod_signals
                .iter()
                .zip(&self.weights.modulatory)
                .map(|(s, w)| (s.as_slice(), w.as_slice()))
                .collect();
            dot_product(&pairs, None).tanh()
        };

        let rule = self.plasticity;
        let limit = self.sat_limit;
        for ((synapse, weights), signal) in self
            .inputs
            .iter()
            .zip(self.weights.inputs.iter_mut())
            .zip(signals)
        {
            for ((w, input), params) in weights.iter_mut().zip(signal).zip(&synapse.params) {
                *w = saturate(rule.update(*input, output, *w, params, modulation), limit);
            }
        }
        if let Some(bias) = self.weights.bias.as_mut() {
            *bias = saturate(rule.update(1.0, output, *bias, &self.bias_params, modulation), limit);
        }
    }

    pub fn handle(&mut self, msg: NeuronMsg) -> Flow {
        match msg {
            NeuronMsg::Forward { from, signal } => self.receive(from, signal),
            NeuronMsg::Backup => self.backup(),
            NeuronMsg::Perturb { spread } => self.perturb(spread),
            NeuronMsg::Restore => self.restore(),
            NeuronMsg::Prepare { ack } => {
                self.reset();
                let _ = ack.send(self.id);
                return Flow::AwaitReset;
            }
            NeuronMsg::Reset => self.reset(),
            NeuronMsg::Weights(reply) => {
                let _ = reply.send(self.weights.clone());
            }
            NeuronMsg::Harvest(reply) => {
                let _ = reply.send(self.harvest());
            }
            NeuronMsg::Stop => return Flow::Stop,
        }
        Flow::Continue
    }

    /// Actor loop; returns when stopped or when every sender is dropped.
    pub fn run(mut self, inbox: Receiver<NeuronMsg>) {
        log::trace!("{}: started", self.id);
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
        log::trace!("{}: stopped after {} ticks", self.id, self.ticks);
    }

    /// Discard stray signals until `Reset`; false if the neuron must stop.
    fn await_reset(&mut self, inbox: &Receiver<NeuronMsg>) -> bool {
        while let Ok(msg) = inbox.recv() {
            match msg {
                NeuronMsg::Reset => {
                    self.reset();
                    return true;
                }
                NeuronMsg::Forward { from, .. } => {
                    log::debug!("{}: discarding signal from {} while resetting", self.id, from);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::WeightGene;
    use crate::message::ActuatorMsg;
    use rand::SeedableRng;
    use std::sync::mpsc::{self, Receiver};

    const OUT: UnitId = UnitId::Actuator(1);

    fn gene(inputs: Vec<InputGene>, bias: Option<f64>) -> NeuronGene {
        NeuronGene {
            id: UnitId::Neuron(1),
            generation: 0,
            activation: Activation::Linear,
            aggregation: Aggregator::DotProduct,
            plasticity: Plasticity::None,
            inputs,
            bias: bias.map(WeightGene::new),
            modulatory: Vec::new(),
            outputs: vec![OUT],
            recurrent_outputs: Vec::new(),
        }
    }

    fn neuron(gene: NeuronGene, heredity: Heredity) -> (Neuron, Receiver<ActuatorMsg>) {
        let (tx, rx) = mpsc::channel();
        let n = Neuron::new(
            gene,
            vec![Endpoint::Actuator(OUT, tx)],
            Vec::new(),
            heredity,
            10.0,
            ChaCha8Rng::seed_from_u64(11),
        );
        (n, rx)
    }

    fn outputs(rx: &Receiver<ActuatorMsg>) -> Vec<f64> {
        rx.try_iter()
            .filter_map(|m| match m {
                ActuatorMsg::Forward { signal, .. } => Some(signal[0]),
                _ => None,
            })
            .collect()
    }

    fn two_sensor_gene() -> NeuronGene {
        gene(
            vec![
                InputGene::new(UnitId::Sensor(1), vec![0.1, 0.2]),
                InputGene::new(UnitId::Sensor(2), vec![0.3, 0.4]),
            ],
            Some(0.5),
        )
    }

    #[test]
    fn test_fires_only_when_all_inputs_arrived() {
        let (mut n, rx) = neuron(two_sensor_gene(), Heredity::Darwinian);

        n.receive(UnitId::Sensor(1), vec![0.5, 0.3]);
        assert!(outputs(&rx).is_empty());

        n.receive(UnitId::Sensor(2), vec![0.2, 0.1]);
        let out = outputs(&rx);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 0.71).abs() < 1e-9);
    }

    #[test]
    fn test_early_signal_queued_for_next_tick() {
        let (mut n, rx) = neuron(two_sensor_gene(), Heredity::Darwinian);

        n.receive(UnitId::Sensor(1), vec![1.0, 0.0]);
        n.receive(UnitId::Sensor(1), vec![0.0, 1.0]);
        assert!(outputs(&rx).is_empty());

        n.receive(UnitId::Sensor(2), vec![0.0, 0.0]);
        n.receive(UnitId::Sensor(2), vec![0.0, 0.0]);
        let out = outputs(&rx);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.6).abs() < 1e-9);
        assert!((out[1] - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_recurrent_input_exempt_on_first_tick_only() {
        let mut g = gene(
            vec![
                InputGene::new(UnitId::Sensor(1), vec![1.0]),
                InputGene::new(UnitId::Neuron(2), vec![2.0]).recurrent(),
            ],
            None,
        );
        g.recurrent_outputs.clear();
        let (mut n, rx) = neuron(g, Heredity::Darwinian);

        n.receive(UnitId::Sensor(1), vec![0.5]);
        assert_eq!(outputs(&rx), vec![0.5]);

        // Second tick needs the recurrent signal as well
        n.receive(UnitId::Sensor(1), vec![0.5]);
        assert!(outputs(&rx).is_empty());
        n.receive(UnitId::Neuron(2), vec![0.25]);
        assert_eq!(outputs(&rx), vec![1.0]);

        // A reset makes the next tick fresh again
        n.receive(UnitId::Neuron(2), vec![0.25]);
        n.reset();
        n.receive(UnitId::Sensor(1), vec![0.1]);
        assert_eq!(outputs(&rx), vec![0.1]);
    }

    #[test]
    fn test_protocol_violations_do_not_corrupt_buffer() {
        let (mut n, rx) = neuron(two_sensor_gene(), Heredity::Darwinian);

        n.receive(UnitId::Neuron(42), vec![1.0]);
        n.receive(UnitId::Sensor(1), vec![1.0, 2.0, 3.0]);
        assert!(n.pending.values().all(|q| q.is_empty()));

        n.receive(UnitId::Sensor(1), vec![0.5, 0.3]);
        n.receive(UnitId::Sensor(2), vec![0.2, 0.1]);
        assert_eq!(outputs(&rx).len(), 1);
    }

    #[test]
    fn test_backup_perturb_restore_roundtrip() {
        let (mut n, _rx) = neuron(two_sensor_gene(), Heredity::Darwinian);
        let before = n.weights().clone();

        n.backup();
        n.perturb(1.0);
        n.perturb(3.0);
        assert_ne!(n.weights(), &before);

        n.restore();
        assert_eq!(n.weights(), &before);
        n.restore();
        assert_eq!(n.weights(), &before);
    }

    #[test]
    fn test_restore_without_backup_is_noop() {
        let (mut n, _rx) = neuron(two_sensor_gene(), Heredity::Darwinian);
        n.perturb(2.0);
        let perturbed = n.weights().clone();
        n.restore();
        assert_eq!(n.weights(), &perturbed);
    }

    #[test]
    fn test_perturb_respects_saturation() {
        let (mut n, _rx) = neuron(two_sensor_gene(), Heredity::Darwinian);
        for _ in 0..200 {
            n.perturb(50.0);
        }
        assert!(n.weights().flatten().iter().all(|w| w.abs() <= 10.0));
    }

    #[test]
    fn test_reset_keeps_weights() {
        let (mut n, rx) = neuron(two_sensor_gene(), Heredity::Darwinian);
        let before = n.weights().clone();
        n.receive(UnitId::Sensor(1), vec![0.5, 0.3]);
        n.reset();
        assert_eq!(n.weights(), &before);

        // The half-delivered tick is gone
        n.receive(UnitId::Sensor(2), vec![0.2, 0.1]);
        assert!(outputs(&rx).is_empty());
    }

    #[test]
    fn test_hebbian_plasticity_updates_weights() {
        let mut g = gene(vec![InputGene::new(UnitId::Sensor(1), vec![0.5])], None);
        g.plasticity = Plasticity::Hebbian { eta: 0.1 };
        let (mut n, rx) = neuron(g, Heredity::Darwinian);

        n.receive(UnitId::Sensor(1), vec![1.0]);
        assert_eq!(outputs(&rx), vec![0.5]);
        // 0.5 + 0.1 * 1.0 * 0.5
        assert!((n.weights().inputs[0][0] - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_plastic_backup_keeps_episode_start() {
        let mut g = gene(vec![InputGene::new(UnitId::Sensor(1), vec![0.5])], None);
        g.plasticity = Plasticity::Hebbian { eta: 0.1 };
        let (mut n, rx) = neuron(g, Heredity::Darwinian);
        let initial = n.weights().clone();

        n.receive(UnitId::Sensor(1), vec![1.0]);
        n.receive(UnitId::Sensor(1), vec![1.0]);
        assert_eq!(outputs(&rx).len(), 2);
        assert_ne!(n.weights(), &initial);

        n.backup();
        n.restore();
        assert_eq!(n.weights(), &initial);

        // The next episode starts from the restored weights
        n.reset();
        n.perturb(1.0);
        let perturbed = n.weights().clone();
        n.receive(UnitId::Sensor(1), vec![1.0]);
        n.backup();
        n.perturb(1.0);
        n.restore();
        assert_eq!(n.weights(), &perturbed);
    }

    #[test]
    fn test_modulatory_input_scales_plasticity() {
        let mut g = gene(vec![InputGene::new(UnitId::Sensor(1), vec![0.5])], None);
        g.plasticity = Plasticity::Hebbian { eta: 0.1 };
        g.modulatory = vec![InputGene::new(UnitId::Sensor(2), vec![1.0])];
        let (mut n, rx) = neuron(g, Heredity::Darwinian);

        n.receive(UnitId::Sensor(1), vec![1.0]);
        assert!(outputs(&rx).is_empty(), "modulatory input gates the tick too");
        n.receive(UnitId::Sensor(2), vec![0.0]);
        assert_eq!(outputs(&rx), vec![0.5]);
        assert_eq!(n.weights().inputs[0][0], 0.5);
    }

    #[test]
    fn test_harvest_follows_heredity() {
        let (mut darwinian, _a) = neuron(two_sensor_gene(), Heredity::Darwinian);
        let (mut lamarckian, _b) = neuron(two_sensor_gene(), Heredity::Lamarckian);
        darwinian.perturb(1.0);
        lamarckian.perturb(1.0);

        assert_eq!(darwinian.harvest(), two_sensor_gene());
        let tuned = lamarckian.harvest();
        assert_eq!(WeightSet::from_gene(&tuned), *lamarckian.weights());
    }

    #[test]
    fn test_actor_prepare_and_reset() {
        let (tx, inbox) = mpsc::channel();
        let (n, rx) = neuron(two_sensor_gene(), Heredity::Darwinian);
        let handle = std::thread::spawn(move || n.run(inbox));

        tx
            .send(NeuronMsg::Forward { from: UnitId::Sensor(1), signal: vec![0.5, 0.3] })
            .unwrap();
        let (ack_tx, ack_rx) = mpsc::channel();
        tx.send(NeuronMsg::Prepare { ack: ack_tx }).unwrap();
        assert_eq!(ack_rx.recv().unwrap(), UnitId::Neuron(1));

        // Stray signal while waiting is discarded
        tx
            .send(NeuronMsg::Forward { from: UnitId::Sensor(2), signal: vec![0.2, 0.1] })
            .unwrap();
        tx.send(NeuronMsg::Reset).unwrap();

        tx
            .send(NeuronMsg::Forward { from: UnitId::Sensor(1), signal: vec![0.5, 0.3] })
            .unwrap();
        tx
            .send(NeuronMsg::Forward { from: UnitId::Sensor(2), signal: vec![0.2, 0.1] })
            .unwrap();
        let (w_tx, w_rx) = mpsc::channel();
        tx.send(NeuronMsg::Weights(w_tx)).unwrap();
        w_rx.recv().unwrap();
        tx.send(NeuronMsg::Stop).unwrap();
        handle.join().unwrap();

        assert_eq!(outputs(&rx).len(), 1);
    }
}
