//! Geometric indirect encoding.
//!
//! A substrate agent has no per-connection genome. Its units sit on planes in
//! a cube spanning `[-1, 1]` on every axis; each connection weight is read off
//! a small CPPN queried with a preprocessed pair of unit coordinates. Only the
//! CPPN is tuned. The connectivity it expresses is re-derived from scratch
//! whenever the CPPN changes.

pub mod actor;
pub mod cep;
pub mod connectivity;
pub mod cpp;
pub mod cppn;
pub mod layout;
pub mod topology;

pub use actor::Substrate;
pub use cep::{CepExpression, CepParams};
pub use connectivity::{DerivedSubstrate, Projection};
pub use cpp::CppEncoding;
pub use cppn::Cppn;
pub use layout::Layout;
pub use topology::LinkTopology;

use crate::error::ConfigError;
use crate::genotype::{NeuronGene, UnitId};
use serde::{Deserialize, Serialize};

/// How a sensor or actuator vector maps onto its plane
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Format {
    /// A single row of `vl` units
    #[default]
    Unstructured,
    /// `width × height` units, row-major
    Grid { width: usize, height: usize },
    /// One explicit `[x, z]` point per element, each within `[-1, 1]`
    Coordinates { points: Vec<[f64; 2]> },
}

impl Format {
    pub fn validate(&self, unit: UnitId, vl: usize) -> Result<(), ConfigError> {
        match self {
            Format::Unstructured => Ok(()),
            Format::Grid { width, height } => {
                if width * height != vl {
                    return Err(ConfigError::unit(
                        unit,
                        format!("grid {}x{} does not hold {} values", width, height, vl),
                    ));
                }
                Ok(())
            }
            Format::Coordinates { points } => {
                if points.len() != vl {
                    return Err(ConfigError::unit(
                        unit,
                        format!("{} coordinates given for {} values", points.len(), vl),
                    ));
                }
                if points.iter().flatten().any(|c| !c.is_finite() || c.abs() > 1.0) {
                    return Err(ConfigError::unit(unit, "coordinates must lie within [-1, 1]"));
                }
                Ok(())
            }
        }
    }
}

/// Hidden-layer geometry: `depth` planes of `width × height` units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Density {
    pub depth: usize,
    pub width: usize,
    pub height: usize,
}

/// How substrate weights change during an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlasticityMode {
    /// Weights are fixed once derived
    #[default]
    None,
    /// Every link carries its own ABCN coefficients
    Abcn,
    /// The CPPN is queried every tick for a bounded weight delta
    Iterative,
}

/// Substrate body of a genotype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstrateGene {
    pub density: Density,
    #[serde(default)]
    pub encoding: CppEncoding,
    #[serde(default)]
    pub expression: CepExpression,
    #[serde(default)]
    pub plasticity: PlasticityMode,
    #[serde(default)]
    pub topology: LinkTopology,
    /// CPPN neurons; inputs from [`UnitId::Cpp`] read the encoded coordinates
    pub cppn: Vec<NeuronGene>,
    /// CPPN neurons whose outputs, in order, feed the connectivity expression
    pub cppn_outputs: Vec<UnitId>,
}

impl SubstrateGene {
    /// Width of the vector the CPPN is queried with
    pub fn cppn_input_width(&self) -> usize {
        self.encoding.width(self.plasticity == PlasticityMode::Iterative)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.density.width == 0 || self.density.height == 0 {
            return Err(ConfigError::Substrate(
                "density width and height must be > 0".to_string(),
            ));
        }
        // Without hidden layers the output layer would be its own Jordan source
        if self.topology == LinkTopology::JordanRecurrent && self.density.depth == 0 {
            return Err(ConfigError::Substrate(
                "jordan_recurrent needs at least one hidden layer".to_string(),
            ));
        }
        let expected = match self.plasticity {
            PlasticityMode::None => &[CepExpression::SetWeight, CepExpression::WeightExpression][..],
            PlasticityMode::Abcn => &[CepExpression::SetAbcn][..],
            PlasticityMode::Iterative => &[CepExpression::SetIterative][..],
        };
        if !expected.contains(&self.expression) {
            return Err(ConfigError::Substrate(format!(
                "{} cannot drive {:?} plasticity",
                self.expression.tag(),
                self.plasticity
            )));
        }
        let cppn = Cppn::compile(&self.cppn, &self.cppn_outputs, self.cppn_input_width())?;
        if cppn.output_width() != self.expression.arity() {
            return Err(ConfigError::Substrate(format!(
                "{} needs {} CPPN outputs, {} given",
                self.expression.tag(),
                self.expression.arity(),
                cppn.output_width()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::genotype::{InputGene, WeightGene};
    use crate::neural::{Activation, Aggregator, Plasticity};

    /// One tanh CPPN neuron per expression output, each reading the encoded
    /// coordinates with the given weights.
    pub fn cppn(weights: &[Vec<f64>]) -> (Vec<NeuronGene>, Vec<UnitId>) {
        let genes: Vec<NeuronGene> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| NeuronGene {
                id: UnitId::Neuron(i as u32 + 1),
                generation: 0,
                activation: Activation::Tanh,
                aggregation: Aggregator::DotProduct,
                plasticity: Plasticity::None,
                inputs: vec![InputGene::new(UnitId::Cpp, w.clone())],
                bias: Some(WeightGene::new(0.1)),
                modulatory: Vec::new(),
                outputs: Vec::new(),
                recurrent_outputs: Vec::new(),
            })
            .collect();
        let outputs = genes.iter().map(|g| g.id).collect();
        (genes, outputs)
    }

    pub fn gene(expression: CepExpression, plasticity: PlasticityMode) -> SubstrateGene {
        let encoding = CppEncoding::Cartesian;
        let width = encoding.width(plasticity == PlasticityMode::Iterative);
        let weights: Vec<Vec<f64>> = (0..expression.arity())
            .map(|k| {
                (0..width)
                    .map(|i| ((i * 7 + k * 3) % 5) as f64 * 0.4 - 0.8)
                    .collect()
            })
            .collect();
        let (cppn, cppn_outputs) = cppn(&weights);
        SubstrateGene {
            density: Density { depth: 1, width: 3, height: 2 },
            encoding,
            expression,
            plasticity,
            topology: LinkTopology::L2lFeedforward,
            cppn,
            cppn_outputs,
        }
    }
}
