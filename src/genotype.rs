//! Instantiation contract.
//!
//! A [`Genotype`] is what an external genome instantiator hands over: every
//! unit of one agent, how the units are wired, and the weights they start
//! with. [`Genotype::validate`] rejects anything an agent could not run.

use crate::error::ConfigError;
use crate::neural::{Activation, Aggregator, Plasticity};
use crate::substrate::{Format, SubstrateGene};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of one unit inside an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitId {
    Sensor(u32),
    Neuron(u32),
    Actuator(u32),
    Substrate,
    /// Coordinate preprocessor feeding a substrate's CPPN
    Cpp,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Sensor(i) => write!(f, "sensor:{}", i),
            UnitId::Neuron(i) => write!(f, "neuron:{}", i),
            UnitId::Actuator(i) => write!(f, "actuator:{}", i),
            UnitId::Substrate => write!(f, "substrate"),
            UnitId::Cpp => write!(f, "cpp"),
        }
    }
}

/// Whether weight tuning is passed on to offspring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heredity {
    /// Offspring inherit the weights the agent was instantiated with
    #[default]
    Darwinian,
    /// Offspring inherit the tuned weights
    Lamarckian,
}

/// Operating mode the cortex reports alongside each episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpMode {
    #[default]
    Training,
    Validation,
    Test,
}

/// One synaptic weight and its plasticity parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightGene {
    pub value: f64,
    #[serde(default)]
    pub params: Vec<f64>,
}

impl WeightGene {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            params: Vec::new(),
        }
    }
}

/// Weights a neuron applies to one source's signal vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputGene {
    pub source: UnitId,
    /// Signal arrives from a later point in the same tick (exempt on the first tick)
    #[serde(default)]
    pub recurrent: bool,
    pub weights: Vec<WeightGene>,
}

impl InputGene {
    pub fn new(source: UnitId, weights: Vec<f64>) -> Self {
        Self {
            source,
            recurrent: false,
            weights: weights.into_iter().map(WeightGene::new).collect(),
        }
    }

    pub fn recurrent(mut self) -> Self {
        self.recurrent = true;
        self
    }
}

/// A neuron as handed over by the instantiator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronGene {
    pub id: UnitId,
    /// Generation in which the neuron was created
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default)]
    pub aggregation: Aggregator,
    #[serde(default)]
    pub plasticity: Plasticity,
    pub inputs: Vec<InputGene>,
    #[serde(default)]
    pub bias: Option<WeightGene>,
    /// Inputs that scale plasticity rather than contribute to the signal
    #[serde(default)]
    pub modulatory: Vec<InputGene>,
    #[serde(default)]
    pub outputs: Vec<UnitId>,
    #[serde(default)]
    pub recurrent_outputs: Vec<UnitId>,
}

impl NeuronGene {
    /// Total number of tunable weights (inputs, modulatory inputs, bias)
    pub fn weight_count(&self) -> usize {
        self.inputs
            .iter()
            .chain(self.modulatory.iter())
            .map(|i| i.weights.len())
            .sum::<usize>()
            + usize::from(self.bias.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorGene {
    pub id: UnitId,
    pub name: String,
    /// Length of the vector the sensor produces
    pub vl: usize,
    #[serde(default)]
    pub format: Format,
    pub fanout: Vec<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorGene {
    pub id: UnitId,
    pub name: String,
    /// Length of the vector the actuator consumes
    pub vl: usize,
    #[serde(default)]
    pub format: Format,
    pub fanin: Vec<UnitId>,
}

/// What sits between sensors and actuators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Neural { neurons: Vec<NeuronGene> },
    Substrate(SubstrateGene),
}

/// Everything needed to instantiate one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genotype {
    pub agent: u64,
    /// Current generation of the agent
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub heredity: Heredity,
    #[serde(default)]
    pub op_mode: OpMode,
    pub sensors: Vec<SensorGene>,
    pub actuators: Vec<ActuatorGene>,
    pub body: Body,
}

impl Genotype {
    /// Neurons that tuning may perturb: the network itself, or a substrate's CPPN.
    pub fn tunable_neurons(&self) -> &[NeuronGene] {
        match &self.body {
            Body::Neural { neurons } => neurons,
            Body::Substrate(substrate) => &substrate.cppn,
        }
    }

    /// Check every reference, kind and weight count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors.is_empty() || self.actuators.is_empty() {
            return Err(ConfigError::Invalid(
                "an agent needs at least one sensor and one actuator".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for sensor in &self.sensors {
            if !matches!(sensor.id, UnitId::Sensor(_)) {
                return Err(ConfigError::unit(sensor.id, "declared as a sensor"));
            }
            if sensor.vl == 0 {
                return Err(ConfigError::unit(sensor.id, "vector length must be > 0"));
            }
            sensor.format.validate(sensor.id, sensor.vl)?;
            if !seen.insert(sensor.id) {
                return Err(ConfigError::DuplicateUnit(sensor.id));
            }
        }
        for actuator in &self.actuators {
            if !matches!(actuator.id, UnitId::Actuator(_)) {
                return Err(ConfigError::unit(actuator.id, "declared as an actuator"));
            }
            if actuator.vl == 0 {
                return Err(ConfigError::unit(actuator.id, "vector length must be > 0"));
            }
            actuator.format.validate(actuator.id, actuator.vl)?;
            if !seen.insert(actuator.id) {
                return Err(ConfigError::DuplicateUnit(actuator.id));
            }
        }

        match &self.body {
            Body::Neural { neurons } => self.validate_neural(neurons, seen),
            Body::Substrate(substrate) => self.validate_substrate(substrate),
        }
    }

    fn validate_neural(
        &self,
        neurons: &[NeuronGene],
        mut seen: BTreeSet<UnitId>,
    ) -> Result<(), ConfigError> {
        let mut by_id: BTreeMap<UnitId, &NeuronGene> = BTreeMap::new();
        for neuron in neurons {
            if !matches!(neuron.id, UnitId::Neuron(_)) {
                return Err(ConfigError::unit(neuron.id, "declared as a neuron"));
            }
            if !seen.insert(neuron.id) {
                return Err(ConfigError::DuplicateUnit(neuron.id));
            }
            by_id.insert(neuron.id, neuron);
        }
        let sensors: BTreeMap<UnitId, &SensorGene> =
            self.sensors.iter().map(|s| (s.id, s)).collect();
        let actuators: BTreeMap<UnitId, &ActuatorGene> =
            self.actuators.iter().map(|a| (a.id, a)).collect();

        // Length of the vector each source emits
        let emits = |unit: UnitId, source: UnitId| -> Result<usize, ConfigError> {
            if let Some(sensor) = sensors.get(&source) {
                Ok(sensor.vl)
            } else if by_id.contains_key(&source) {
                Ok(1)
            } else {
                Err(ConfigError::DanglingReference {
                    unit,
                    missing: source,
                })
            }
        };

        for sensor in &self.sensors {
            if sensor.fanout.is_empty() {
                return Err(ConfigError::unit(sensor.id, "fanout is empty"));
            }
            for target in &sensor.fanout {
                let neuron = by_id.get(target).ok_or(ConfigError::DanglingReference {
                    unit: sensor.id,
                    missing: *target,
                })?;
                let feeds = neuron
                    .inputs
                    .iter()
                    .filter(|i| !i.recurrent)
                    .chain(neuron.modulatory.iter())
                    .any(|i| i.source == sensor.id);
                if !feeds {
                    return Err(ConfigError::unit(
                        *target,
                        format!("has no input from {}", sensor.id),
                    ));
                }
            }
        }

        for actuator in &self.actuators {
            if actuator.fanin.len() != actuator.vl {
                return Err(ConfigError::unit(
                    actuator.id,
                    format!(
                        "consumes {} values but has {} fanin neurons",
                        actuator.vl,
                        actuator.fanin.len()
                    ),
                ));
            }
            for source in &actuator.fanin {
                let neuron = by_id.get(source).ok_or(ConfigError::DanglingReference {
                    unit: actuator.id,
                    missing: *source,
                })?;
                if !neuron.outputs.contains(&actuator.id) {
                    return Err(ConfigError::unit(
                        *source,
                        format!("does not output to {}", actuator.id),
                    ));
                }
            }
        }

        for neuron in neurons {
            if !neuron.inputs.iter().any(|i| !i.recurrent) {
                return Err(ConfigError::unit(
                    neuron.id,
                    "needs at least one non-recurrent input",
                ));
            }
            let per_weight = neuron.plasticity.weight_params();
            let mut sources = BTreeSet::new();
            for input in neuron.inputs.iter().chain(neuron.modulatory.iter()) {
                if !sources.insert(input.source) {
                    return Err(ConfigError::unit(
                        neuron.id,
                        format!("lists {} as a source twice", input.source),
                    ));
                }
                let expected = emits(neuron.id, input.source)?;
                if input.weights.len() != expected {
                    return Err(ConfigError::WeightCount {
                        unit: neuron.id,
                        from: input.source,
                        expected,
                        found: input.weights.len(),
                    });
                }
                if input.weights.iter().any(|w| w.params.len() != per_weight) {
                    return Err(ConfigError::unit(
                        neuron.id,
                        format!("weights from {} need {} plasticity parameters", input.source, per_weight),
                    ));
                }
                // The source must list this neuron among its destinations
                let listed = match input.source {
                    UnitId::Sensor(_) => sensors
                        .get(&input.source)
                        .map_or(false, |s| s.fanout.contains(&neuron.id)),
                    _ => by_id.get(&input.source).map_or(false, |n| {
                        if input.recurrent {
                            n.recurrent_outputs.contains(&neuron.id)
                        } else {
                            n.outputs.contains(&neuron.id)
                        }
                    }),
                };
                if !listed {
                    return Err(ConfigError::unit(
                        neuron.id,
                        format!("input from {} is not mirrored by that unit's outputs", input.source),
                    ));
                }
            }
            if let Some(bias) = &neuron.bias {
                if bias.params.len() != per_weight {
                    return Err(ConfigError::unit(
                        neuron.id,
                        format!("bias needs {} plasticity parameters", per_weight),
                    ));
                }
            }

            for target in &neuron.outputs {
                match target {
                    UnitId::Actuator(_) => {
                        let actuator = actuators.get(target).ok_or(ConfigError::DanglingReference {
                            unit: neuron.id,
                            missing: *target,
                        })?;
                        if !actuator.fanin.contains(&neuron.id) {
                            return Err(ConfigError::unit(
                                *target,
                                format!("does not list {} in its fanin", neuron.id),
                            ));
                        }
                    }
                    _ => {
                        let other = by_id.get(target).ok_or(ConfigError::DanglingReference {
                            unit: neuron.id,
                            missing: *target,
                        })?;
                        let wired = other
                            .inputs
                            .iter()
                            .chain(other.modulatory.iter())
                            .any(|i| i.source == neuron.id && !i.recurrent);
                        if !wired {
                            return Err(ConfigError::unit(
                                *target,
                                format!("has no forward input from {}", neuron.id),
                            ));
                        }
                    }
                }
            }
            for target in &neuron.recurrent_outputs {
                let other = by_id.get(target).ok_or(ConfigError::DanglingReference {
                    unit: neuron.id,
                    missing: *target,
                })?;
                let wired = other
                    .inputs
                    .iter()
                    .chain(other.modulatory.iter())
                    .any(|i| i.source == neuron.id && i.recurrent);
                if !wired {
                    return Err(ConfigError::unit(
                        *target,
                        format!("has no recurrent input from {}", neuron.id),
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_substrate(&self, substrate: &SubstrateGene) -> Result<(), ConfigError> {
        for sensor in &self.sensors {
            if sensor.fanout != [UnitId::Substrate] {
                return Err(ConfigError::unit(sensor.id, "must fan out to the substrate only"));
            }
        }
        for actuator in &self.actuators {
            if actuator.fanin != [UnitId::Substrate] {
                return Err(ConfigError::unit(actuator.id, "must fan in from the substrate only"));
            }
        }
        substrate.validate()
    }

    /// Layered feed-forward neural genotype with random weights.
    ///
    /// `sensors` and `actuators` are `(name, vector length)` pairs; each actuator
    /// value gets its own output neuron.
    pub fn dense<R: Rng>(
        agent: u64,
        sensors: &[(&str, usize)],
        hidden: &[usize],
        actuators: &[(&str, usize)],
        activation: Activation,
        rng: &mut R,
    ) -> Genotype {
        let mut next = 0u32;
        let mut layer_ids: Vec<Vec<UnitId>> = Vec::new();
        let output_count: usize = actuators.iter().map(|(_, vl)| vl).sum();
        for &width in hidden.iter().chain(std::iter::once(&output_count)) {
            let ids = (0..width)
                .map(|_| {
                    next += 1;
                    UnitId::Neuron(next)
                })
                .collect();
            layer_ids.push(ids);
        }

        let sensor_genes: Vec<SensorGene> = sensors
            .iter()
            .enumerate()
            .map(|(i, (name, vl))| SensorGene {
                id: UnitId::Sensor(i as u32 + 1),
                name: name.to_string(),
                vl: *vl,
                format: Format::Unstructured,
                fanout: layer_ids[0].clone(),
            })
            .collect();

        let mut actuator_genes = Vec::new();
        let mut offset = 0;
        for (i, (name, vl)) in actuators.iter().enumerate() {
            let fanin = layer_ids[layer_ids.len() - 1][offset..offset + vl].to_vec();
            offset += vl;
            actuator_genes.push(ActuatorGene {
                id: UnitId::Actuator(i as u32 + 1),
                name: name.to_string(),
                vl: *vl,
                format: Format::Unstructured,
                fanin,
            });
        }

        let mut neurons = Vec::new();
        for (depth, ids) in layer_ids.iter().enumerate() {
            for (index, &id) in ids.iter().enumerate() {
                let inputs = if depth == 0 {
                    sensor_genes
                        .iter()
                        .map(|s| {
                            InputGene::new(s.id, (0..s.vl).map(|_| rng.gen_range(-0.5..0.5)).collect())
                        })
                        .collect()
                } else {
                    layer_ids[depth - 1]
                        .iter()
                        .map(|&source| InputGene::new(source, vec![rng.gen_range(-0.5..0.5)]))
                        .collect()
                };
                let outputs = if depth + 1 < layer_ids.len() {
                    layer_ids[depth + 1].clone()
                } else {
                    let mut remaining = index;
                    let mut target = actuator_genes[0].id;
                    for actuator in &actuator_genes {
                        if remaining < actuator.vl {
                            target = actuator.id;
                            break;
                        }
                        remaining -= actuator.vl;
                    }
                    vec![target]
                };
                neurons.push(NeuronGene {
                    id,
                    generation: 0,
                    activation,
                    aggregation: Aggregator::DotProduct,
                    plasticity: Plasticity::None,
                    inputs,
                    bias: Some(WeightGene::new(rng.gen_range(-0.5..0.5))),
                    modulatory: Vec::new(),
                    outputs,
                    recurrent_outputs: Vec::new(),
                });
            }
        }

        Genotype {
            agent,
            generation: 0,
            heredity: Heredity::Darwinian,
            op_mode: OpMode::Training,
            sensors: sensor_genes,
            actuators: actuator_genes,
            body: Body::Neural { neurons },
        }
    }
}
