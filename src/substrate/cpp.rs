//! Coordinate preprocessing.
//!
//! Turns a `(source, target)` pair of unit coordinates into the vector a
//! substrate's CPPN is queried with.

use super::layout::Point;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CppEncoding {
    /// `[x1, y1, z1, x2, y2, z2]`
    #[default]
    Cartesian,
    /// Cartesian plus the distance between the points
    CartesianDistance,
    /// `[x2 - x1, y2 - y1, z2 - z1]`
    CartesianCoordDiffs,
    /// `[r, θ, z]` per point, `r` and `θ` taken in the x/y plane
    Polar,
    /// `[ρ, θ, φ]` per point
    Spherical,
    /// Distance of each point from the origin
    CentripetalDistances,
}

impl CppEncoding {
    pub const ALL: [CppEncoding; 6] = [
        CppEncoding::Cartesian,
        CppEncoding::CartesianDistance,
        CppEncoding::CartesianCoordDiffs,
        CppEncoding::Polar,
        CppEncoding::Spherical,
        CppEncoding::CentripetalDistances,
    ];

    /// Encoded width; `iow` adds the link's `(input, output, weight)`.
    pub fn width(self, iow: bool) -> usize {
        let base = match self {
            CppEncoding::Cartesian => 6,
            CppEncoding::CartesianDistance => 7,
            CppEncoding::CartesianCoordDiffs => 3,
            CppEncoding::Polar => 6,
            CppEncoding::Spherical => 6,
            CppEncoding::CentripetalDistances => 2,
        };
        if iow {
            base + 3
        } else {
            base
        }
    }

    /// Append the encoding of `from -> to` to `out`.
    pub fn encode(self, from: Point, to: Point, out: &mut Vec<f64>) {
        match self {
            CppEncoding::Cartesian => {
                out.extend_from_slice(&from);
                out.extend_from_slice(&to);
            }
            CppEncoding::CartesianDistance => {
                out.extend_from_slice(&from);
                out.extend_from_slice(&to);
                out.push(distance(from, to));
            }
            CppEncoding::CartesianCoordDiffs => {
                out.extend((0..3).map(|i| to[i] - from[i]));
            }
            CppEncoding::Polar => {
                out.extend_from_slice(&polar(from));
                out.extend_from_slice(&polar(to));
            }
            CppEncoding::Spherical => {
                out.extend_from_slice(&spherical(from));
                out.extend_from_slice(&spherical(to));
            }
            CppEncoding::CentripetalDistances => {
                out.push(norm(from));
                out.push(norm(to));
            }
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            CppEncoding::Cartesian => "cartesian",
            CppEncoding::CartesianDistance => "cartesian_distance",
            CppEncoding::CartesianCoordDiffs => "cartesian_coord_diffs",
            CppEncoding::Polar => "polar",
            CppEncoding::Spherical => "spherical",
            CppEncoding::CentripetalDistances => "centripetal_distances",
        }
    }
}

impl FromStr for CppEncoding {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        CppEncoding::ALL
            .into_iter()
            .find(|e| e.tag() == tag)
            .ok_or_else(|| ConfigError::UnknownTag {
                kind: "cpp",
                tag: tag.to_string(),
            })
    }
}

/// Append a link's live `(input, output, weight)` for iterative plasticity.
#[inline]
pub fn iow(input: f64, output: f64, weight: f64, out: &mut Vec<f64>) {
    out.extend_from_slice(&[input, output, weight]);
}

fn norm(p: Point) -> f64 {
    (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt()
}

fn distance(a: Point, b: Point) -> f64 {
    norm([b[0] - a[0], b[1] - a[1], b[2] - a[2]])
}

fn polar([x, y, z]: Point) -> [f64; 3] {
    [(x * x + y * y).sqrt(), y.atan2(x), z]
}

fn spherical(p: Point) -> [f64; 3] {
    let rho = norm(p);
    let theta = p[1].atan2(p[0]);
    let phi = if rho == 0.0 { 0.0 } else { (p[2] / rho).acos() };
    [rho, theta, phi]
}
