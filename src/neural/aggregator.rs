//! Signal aggregation strategies.
//!
//! An aggregator reduces a neuron's buffered `(signal, weights)` pairs, one per
//! input source, to the scalar handed to the activation function. The bias, when
//! present, is treated as one more source whose signal is always `1.0`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Aggregation function tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    /// Weighted sum over every source plus bias
    #[default]
    DotProduct,
    /// Product of per-source weighted sums, times bias
    MultProduct,
    /// Weighted sum of the change in each signal since the previous tick
    DiffProduct,
}

/// Per-unit state carried between ticks by stateful aggregators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorMemory {
    previous: Option<Vec<Vec<f64>>>,
}

impl AggregatorMemory {
    pub fn clear(&mut self) {
        self.previous = None;
    }
}

impl Aggregator {
    /// Reduce `inputs` (signal, weights per source) and `bias` to a scalar.
    pub fn apply(
        self,
        inputs: &[(&[f64], &[f64])],
        bias: Option<f64>,
        memory: &mut AggregatorMemory,
    ) -> f64 {
        match self {
            Aggregator::DotProduct => dot_product(inputs, bias),
            Aggregator::MultProduct => mult_product(inputs, bias),
            Aggregator::DiffProduct => diff_product(inputs, bias, memory),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Aggregator::DotProduct => "dot_product",
            Aggregator::MultProduct => "mult_product",
            Aggregator::DiffProduct => "diff_product",
        }
    }
}

impl FromStr for Aggregator {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "dot_product" => Ok(Aggregator::DotProduct),
            "mult_product" => Ok(Aggregator::MultProduct),
            "diff_product" => Ok(Aggregator::DiffProduct),
            other => Err(ConfigError::UnknownTag {
                kind: "aggregation",
                tag: other.to_string(),
            }),
        }
    }
}

#[inline]
fn weighted(signal: &[f64], weights: &[f64]) -> f64 {
    signal.iter().zip(weights).map(|(s, w)| s * w).sum()
}

/// sum(signal[i] * weight[i]) over every source, plus bias
pub fn dot_product(inputs: &[(&[f64], &[f64])], bias: Option<f64>) -> f64 {
    inputs
        .iter()
        .map(|(signal, weights)| weighted(signal, weights))
        .sum::<f64>()
        + bias.unwrap_or(0.0)
}

/// Product of every source's weighted sum, multiplied by the bias
pub fn mult_product(inputs: &[(&[f64], &[f64])], bias: Option<f64>) -> f64 {
    let product: f64 = inputs
        .iter()
        .map(|(signal, weights)| weighted(signal, weights))
        .product();
    product * bias.unwrap_or(1.0)
}

/// Dot product over `signal - previous_signal`; the first tick sees raw signals.
pub fn diff_product(
    inputs: &[(&[f64], &[f64])],
    bias: Option<f64>,
    memory: &mut AggregatorMemory,
) -> f64 {
    let current: Vec<Vec<f64>> = inputs.iter().map(|(signal, _)| signal.to_vec()).collect();

    let value = match memory.previous.as_ref() {
        Some(previous) if same_shape(previous, &current) => inputs
            .iter()
            .zip(previous)
            .map(|((signal, weights), prev)| {
                signal
                    .iter()
                    .zip(prev.iter())
                    .zip(weights.iter())
                    .map(|((s, p), w)| (s - p) * w)
                    .sum::<f64>()
            })
            .sum::<f64>()
            + bias.unwrap_or(0.0),
        _ => dot_product(inputs, bias),
    };

    memory.previous = Some(current);
    value
}

fn same_shape(a: &[Vec<f64>], b: &[Vec<f64>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.len() == y.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product_reference_value() {
        let s1 = [0.5, 0.3];
        let s2 = [0.2, 0.1];
        let w1 = [0.1, 0.2];
        let w2 = [0.3, 0.4];
        let inputs: [(&[f64], &[f64]); 2] = [(&s1, &w1), (&s2, &w2)];
        let mut memory = AggregatorMemory::default();

        let value = Aggregator::DotProduct.apply(&inputs, Some(0.5), &mut memory);
        assert!((value - 0.71).abs() < 1e-3);
    }

    #[test]
    fn test_mult_product_gates() {
        let s1 = [1.0, 1.0];
        let s2 = [0.0];
        let w1 = [0.5, 0.5];
        let w2 = [3.0];
        let mut memory = AggregatorMemory::default();

        // One silent source closes the gate entirely
        let inputs: [(&[f64], &[f64]); 2] = [(&s1, &w1), (&s2, &w2)];
        assert_eq!(Aggregator::MultProduct.apply(&inputs, Some(2.0), &mut memory), 0.0);

        let s2 = [2.0];
        let inputs: [(&[f64], &[f64]); 2] = [(&s1, &w1), (&s2, &w2)];
        // (1.0) * (6.0) * bias 2.0
        assert!((Aggregator::MultProduct.apply(&inputs, Some(2.0), &mut memory) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_diff_product_tracks_change() {
        let w = [1.0, 2.0];
        let mut memory = AggregatorMemory::default();

        let first = [1.0, 1.0];
        let inputs: [(&[f64], &[f64]); 1] = [(&first, &w)];
        assert!((Aggregator::DiffProduct.apply(&inputs, None, &mut memory) - 3.0).abs() < 1e-12);

        // Same signal again: no change, aggregate is zero
        assert!(Aggregator::DiffProduct.apply(&inputs, None, &mut memory).abs() < 1e-12);

        let next = [2.0, 0.5];
        let inputs: [(&[f64], &[f64]); 1] = [(&next, &w)];
        // (2-1)*1 + (0.5-1)*2 = 0.0
        assert!((Aggregator::DiffProduct.apply(&inputs, Some(0.25), &mut memory) - 0.25).abs() < 1e-12);

        memory.clear();
        assert!((Aggregator::DiffProduct.apply(&inputs, None, &mut memory) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        assert!("dot_product".parse::<Aggregator>().is_ok());
        assert!(matches!(
            "max_product".parse::<Aggregator>(),
            Err(ConfigError::UnknownTag { kind: "aggregation", .. })
        ));
    }
}
