//! Connectivity expression: CPPN output to link weight.

use crate::config::SubstrateConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CepExpression {
    /// Weight read directly, with a dead zone around zero
    #[default]
    SetWeight,
    /// Weight plus the link's ABCN coefficients
    SetAbcn,
    /// Bounded delta added to the link's live weight
    SetIterative,
    /// Raw output saturated to the substrate limit
    WeightExpression,
}

/// Numeric knobs shared by every expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CepParams {
    pub threshold: f64,
    pub sat_limit: f64,
    pub max_delta: f64,
}

impl From<&SubstrateConfig> for CepParams {
    fn from(config: &SubstrateConfig) -> Self {
        Self {
            threshold: config.weight_threshold,
            sat_limit: config.sat_limit,
            max_delta: config.max_delta,
        }
    }
}

impl Default for CepParams {
    fn default() -> Self {
        Self::from(&SubstrateConfig::default())
    }
}

impl CepExpression {
    /// CPPN outputs consumed per query
    pub fn arity(self) -> usize {
        match self {
            CepExpression::SetAbcn => 5,
            _ => 1,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            CepExpression::SetWeight => "set_weight",
            CepExpression::SetAbcn => "set_abcn",
            CepExpression::SetIterative => "set_iterative",
            CepExpression::WeightExpression => "weight_expression",
        }
    }
}

impl FromStr for CepExpression {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "set_weight" => Ok(CepExpression::SetWeight),
            "set_abcn" => Ok(CepExpression::SetAbcn),
            "set_iterative" => Ok(CepExpression::SetIterative),
            "weight_expression" => Ok(CepExpression::WeightExpression),
            other => Err(ConfigError::UnknownTag {
                kind: "cep",
                tag: other.to_string(),
            }),
        }
    }
}

/// Map `value` linearly so that `min -> -1` and `max -> 1`.
#[inline]
fn scale(value: f64, max: f64, min: f64) -> f64 {
    if max == min {
        0.0
    } else {
        (2.0 * value - (max + min)) / (max - min)
    }
}

/// Zero inside `[-threshold, threshold]`, rescaled to `(0, 1]` / `[-1, 0)` outside.
pub fn dead_zone(value: f64, threshold: f64) -> f64 {
    let v = value.clamp(-1.0, 1.0);
    if v > threshold {
        (scale(v, 1.0, threshold) + 1.0) / 2.0
    } else if v < -threshold {
        (scale(v, -threshold, -1.0) - 1.0) / 2.0
    } else {
        0.0
    }
}

pub fn set_weight(output: &[f64], params: &CepParams) -> f64 {
    dead_zone(output.first().copied().unwrap_or(0.0), params.threshold)
}

pub fn weight_expression(output: &[f64], params: &CepParams) -> f64 {
    let raw = output.first().copied().unwrap_or(0.0);
    raw.clamp(-params.sat_limit, params.sat_limit)
}

/// Delta to add to a link's weight, within `±max_delta`
pub fn set_iterative(output: &[f64], params: &CepParams) -> f64 {
    set_weight(output, params) * params.max_delta
}

/// `[weight, a, b, c, n]`; missing coefficients read as zero
pub fn set_abcn(output: &[f64], params: &CepParams) -> [f64; 5] {
    let mut expressed = [0.0; 5];
    expressed[0] = set_weight(output, params);
    for (slot, value) in expressed[1..].iter_mut().zip(output.iter().skip(1)) {
        *slot = *value;
    }
    expressed
}
