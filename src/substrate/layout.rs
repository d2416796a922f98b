//! Unit placement.
//!
//! Layer 0 is the input plane at `y = -1`, built from the sensors' formats with
//! each sensor given its own band along `z`. Hidden planes follow at evenly
//! spaced `y`, and the output plane sits at `y = +1`.

use super::{Density, Format};
use crate::genotype::{ActuatorGene, SensorGene, UnitId};
use std::ops::Range;

pub type Point = [f64; 3];

/// `i`-th of `n` evenly spread positions across `[-1, 1]`; 0 when alone
#[inline]
pub fn spread(i: usize, n: usize) -> f64 {
    if n <= 1 {
        0.0
    } else {
        -1.0 + 2.0 * i as f64 / (n - 1) as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Unit coordinates per layer, input plane first
    pub layers: Vec<Vec<Point>>,
    /// Slice of the input plane each sensor fills
    pub inputs: Vec<(UnitId, Range<usize>)>,
    /// Slice of the output plane each actuator reads
    pub outputs: Vec<(UnitId, Range<usize>)>,
}

impl Layout {
    pub fn build(sensors: &[SensorGene], actuators: &[ActuatorGene], density: Density) -> Self {
        let (input_plane, inputs) = plane(
            -1.0,
            sensors.iter().map(|s| (s.id, s.vl, &s.format)).collect(),
        );
        let (output_plane, outputs) = plane(
            1.0,
            actuators.iter().map(|a| (a.id, a.vl, &a.format)).collect(),
        );

        let mut layers = Vec::with_capacity(density.depth + 2);
        layers.push(input_plane);
        for l in 0..density.depth {
            let y = -1.0 + 2.0 * (l + 1) as f64 / (density.depth + 1) as f64;
            let mut hidden = Vec::with_capacity(density.width * density.height);
            for row in 0..density.height {
                for col in 0..density.width {
                    hidden.push([spread(col, density.width), y, spread(row, density.height)]);
                }
            }
            layers.push(hidden);
        }
        layers.push(output_plane);

        Self {
            layers,
            inputs,
            outputs,
        }
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.layers.iter().map(Vec::len).collect()
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map_or(0, Vec::len)
    }
}

fn plane(y: f64, units: Vec<(UnitId, usize, &Format)>) -> (Vec<Point>, Vec<(UnitId, Range<usize>)>) {
    let bands = units.len().max(1);
    let band = 2.0 / bands as f64;
    let mut points = Vec::new();
    let mut ranges = Vec::with_capacity(units.len());

    for (k, (id, vl, format)) in units.into_iter().enumerate() {
        let center = -1.0 + band * (k as f64 + 0.5);
        let squeeze = |z: f64| center + z * band / 2.0;
        let start = points.len();
        match format {
            Format::Unstructured => {
                points.extend((0..vl).map(|i| [spread(i, vl), y, squeeze(0.0)]));
            }
            Format::Grid { width, height } => {
                for row in 0..*height {
                    for col in 0..*width {
                        points.push([spread(col, *width), y, squeeze(spread(row, *height))]);
                    }
                }
            }
            Format::Coordinates { points: explicit } => {
                points.extend(explicit.iter().map(|[x, z]| [*x, y, squeeze(*z)]));
            }
        }
        ranges.push((id, start..points.len()));
    }
    (points, ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(id: u32, vl: usize, format: Format) -> SensorGene {
        SensorGene {
            id: UnitId::Sensor(id),
            name: format!("s{}", id),
            vl,
            format,
            fanout: vec![UnitId::Substrate],
        }
    }

    fn actuator(id: u32, vl: usize) -> ActuatorGene {
        ActuatorGene {
            id: UnitId::Actuator(id),
            name: format!("a{}", id),
            vl,
            format: Format::Unstructured,
            fanin: vec![UnitId::Substrate],
        }
    }

    #[test]
    fn test_spread() {
        assert_eq!(spread(0, 1), 0.0);
        assert_eq!(spread(0, 3), -1.0);
        assert_eq!(spread(1, 3), 0.0);
        assert_eq!(spread(2, 3), 1.0);
    }

    #[test]
    fn test_layers_and_planes() {
        let layout = Layout::build(
            &[sensor(1, 3, Format::Unstructured)],
            &[actuator(1, 1)],
            Density { depth: 2, width: 2, height: 3 },
        );
        assert_eq!(layout.sizes(), vec![3, 6, 6, 1]);
        assert!(layout.layers[0].iter().all(|p| p[1] == -1.0 && p[2] == 0.0));
        assert_eq!(layout.layers[3], vec![[0.0, 1.0, 0.0]]);

        let y1 = layout.layers[1][0][1];
        let y2 = layout.layers[2][0][1];
        assert!((y1 + 1.0 / 3.0).abs() < 1e-12);
        assert!((y2 - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_sensors_get_separate_bands() {
        let layout = Layout::build(
            &[
                sensor(1, 2, Format::Unstructured),
                sensor(2, 4, Format::Grid { width: 2, height: 2 }),
            ],
            &[actuator(1, 2)],
            Density { depth: 0, width: 1, height: 1 },
        );
        assert_eq!(layout.inputs, vec![(UnitId::Sensor(1), 0..2), (UnitId::Sensor(2), 2..6)]);
        assert_eq!(layout.layers.len(), 2);

        // First band is z in [-1, 0], second is [0, 1]
        assert!(layout.layers[0][..2].iter().all(|p| p[2] == -0.5));
        assert!(layout.layers[0][2..].iter().all(|p| p[2] >= 0.0 && p[2] <= 1.0));
        assert_eq!(layout.layers[0][2], [-1.0, -1.0, 0.0]);
        assert_eq!(layout.layers[0][5], [1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_explicit_coordinates() {
        let layout = Layout::build(
            &[sensor(1, 2, Format::Coordinates { points: vec![[0.25, -1.0], [-0.5, 0.5]] })],
            &[actuator(1, 1)],
            Density { depth: 1, width: 1, height: 1 },
        );
        assert_eq!(layout.layers[0], vec![[0.25, -1.0, -1.0], [-0.5, -1.0, 0.5]]);
        assert_eq!(layout.layers[1], vec![[0.0, 0.0, 0.0]]);
    }
}
