//! Activation functions applied to a neuron's aggregated input.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Activation function tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Tanh,
    Sigmoid,
    Sigmoid1,
    Sin,
    Cos,
    Gaussian,
    Linear,
    Relu,
    Sgn,
    Bin,
    Trinary,
    Multiquadric,
    Quadratic,
    Cubic,
    Absolute,
    Sqrt,
    Log,
}

impl Activation {
    /// All known activation functions
    pub const ALL: [Activation; 17] = [
        Activation::Tanh,
        Activation::Sigmoid,
        Activation::Sigmoid1,
        Activation::Sin,
        Activation::Cos,
        Activation::Gaussian,
        Activation::Linear,
        Activation::Relu,
        Activation::Sgn,
        Activation::Bin,
        Activation::Trinary,
        Activation::Multiquadric,
        Activation::Quadratic,
        Activation::Cubic,
        Activation::Absolute,
        Activation::Sqrt,
        Activation::Log,
    ];

    #[inline(always)]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => {
                let v = x.clamp(-10.0, 10.0);
                1.0 / (1.0 + (-v).exp())
            }
            Activation::Sigmoid1 => x / (1.0 + x.abs()),
            Activation::Sin => x.sin(),
            Activation::Cos => x.cos(),
            Activation::Gaussian => {
                let v = x.clamp(-10.0, 10.0);
                (-v * v).exp()
            }
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Sgn => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Activation::Bin => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Trinary => {
                if x < 0.33 && x > -0.33 {
                    0.0
                } else if x >= 0.33 {
                    1.0
                } else {
                    -1.0
                }
            }
            Activation::Multiquadric => (x * x + 0.01).sqrt(),
            Activation::Quadratic => x.signum() * x * x,
            Activation::Cubic => x * x * x,
            Activation::Absolute => x.abs(),
            Activation::Sqrt => x.signum() * x.abs().sqrt(),
            Activation::Log => {
                if x == 0.0 {
                    0.0
                } else {
                    x.signum() * x.abs().ln()
                }
            }
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Sigmoid1 => "sigmoid1",
            Activation::Sin => "sin",
            Activation::Cos => "cos",
            Activation::Gaussian => "gaussian",
            Activation::Linear => "linear",
            Activation::Relu => "relu",
            Activation::Sgn => "sgn",
            Activation::Bin => "bin",
            Activation::Trinary => "trinary",
            Activation::Multiquadric => "multiquadric",
            Activation::Quadratic => "quadratic",
            Activation::Cubic => "cubic",
            Activation::Absolute => "absolute",
            Activation::Sqrt => "sqrt",
            Activation::Log => "log",
        }
    }
}

impl FromStr for Activation {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Activation::ALL
            .iter()
            .copied()
            .find(|a| a.tag() == tag)
            .ok_or_else(|| ConfigError::UnknownTag {
                kind: "activation",
                tag: tag.to_string(),
            })
    }
}
