//! Lifetime plasticity rules.
//!
//! A rule is applied after a neuron forwards its output: every input weight is
//! nudged using the signal it carried, the neuron's output and the weight itself.
//! Rules ending in `_w` read their coefficients from each weight's own parameter
//! list instead of the unit-wide tag.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// ABCN update: `w + n * (a*input*output + b*input + c*output)`
#[inline]
pub fn abcn(input: f64, output: f64, weight: f64, params: [f64; 4]) -> f64 {
    weight + abcn_delta(input, output, params)
}

#[inline]
fn abcn_delta(input: f64, output: f64, [a, b, c, n]: [f64; 4]) -> f64 {
    n * (a * input * output + b * input + c * output)
}

/// Plasticity function tag plus its unit-wide parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Plasticity {
    #[default]
    None,
    /// Δw = eta * input * output
    Hebbian { eta: f64 },
    /// Hebbian with a per-weight learning rate `[eta]`
    HebbianW,
    /// Δw = eta * output * (input - output * w)
    Ojas { eta: f64 },
    /// Oja's rule with a per-weight learning rate `[eta]`
    OjasW,
    /// ABCN rule with unit-wide coefficients
    Abcn { a: f64, b: f64, c: f64, n: f64 },
    /// ABCN rule with per-weight coefficients `[a, b, c, n]`
    AbcnW,
}

impl Plasticity {
    /// Parse a tag and its unit-wide parameter list.
    pub fn from_tag(tag: &str, params: &[f64]) -> Result<Self, ConfigError> {
        let arity = |n: usize| {
            if params.len() == n {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "plasticity `{}` takes {} parameters, got {}",
                    tag,
                    n,
                    params.len()
                )))
            }
        };
        match tag {
            "none" => arity(0).map(|_| Plasticity::None),
            "hebbian" => arity(1).map(|_| Plasticity::Hebbian { eta: params[0] }),
            "hebbian_w" => arity(0).map(|_| Plasticity::HebbianW),
            "ojas" => arity(1).map(|_| Plasticity::Ojas { eta: params[0] }),
            "ojas_w" => arity(0).map(|_| Plasticity::OjasW),
            "abcn" => arity(4).map(|_| Plasticity::Abcn {
                a: params[0],
                b: params[1],
                c: params[2],
                n: params[3],
            }),
            "abcn_w" => arity(0).map(|_| Plasticity::AbcnW),
            other => Err(ConfigError::UnknownTag {
                kind: "plasticity",
                tag: other.to_string(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Plasticity::None)
    }

    /// Number of per-weight parameters every weight must carry.
    pub fn weight_params(&self) -> usize {
        match self {
            Plasticity::HebbianW | Plasticity::OjasW => 1,
            Plasticity::AbcnW => 4,
            _ => 0,
        }
    }

    /// New value for `weight` after one tick; `modulation` scales the delta.
    pub fn update(&self, input: f64, output: f64, weight: f64, params: &[f64], modulation: f64) -> f64 {
        let delta = match *self {
            Plasticity::None => 0.0,
            Plasticity::Hebbian { eta } => eta * input * output,
            Plasticity::HebbianW => params.first().copied().unwrap_or(0.0) * input * output,
            Plasticity::Ojas { eta } => eta * output * (input - output * weight),
            Plasticity::OjasW => {
                params.first().copied().unwrap_or(0.0) * output * (input - output * weight)
            }
            Plasticity::Abcn { a, b, c, n } => abcn_delta(input, output, [a, b, c, n]),
            Plasticity::AbcnW => match params {
                [a, b, c, n] => abcn_delta(input, output, [*a, *b, *c, *n]),
                _ => 0.0,
            },
        };
        weight + modulation * delta
    }
}
