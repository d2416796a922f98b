//! Deriving and running the substrate's connectivity.
//!
//! Derivation is a pure function of the layout, the topology, the encoding,
//! the expression and the CPPN weights. Rows are computed in parallel and
//! collected in order, so the result never depends on scheduling.

use super::cep::{self, CepExpression, CepParams};
use super::cpp::{self, CppEncoding};
use super::layout::Layout;
use super::topology::LinkTopology;
use super::Cppn;
use crate::neural::abcn;
use ndarray::{Array1, Array2, Array3, Zip};
use rayon::prelude::*;

/// All links from one source layer into one target layer
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub target: usize,
    pub source: usize,
    pub diagonal: bool,
    /// `targets × sources`
    pub weights: Array2<f64>,
    /// `targets × sources × [a, b, c, n]`, only under ABCN plasticity
    pub abcn: Option<Array3<f64>>,
}

impl Projection {
    /// Reads the source's output from the previous tick
    pub fn recurrent(&self) -> bool {
        self.source >= self.target
    }
}

/// Everything a derivation depends on besides the CPPN weights
#[derive(Debug, Clone)]
pub struct Geometry {
    pub layout: Layout,
    pub topology: LinkTopology,
    pub encoding: CppEncoding,
    pub expression: CepExpression,
    pub params: CepParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSubstrate {
    pub sizes: Vec<usize>,
    /// Ordered by target layer, then by source layer as the topology lists them
    pub projections: Vec<Projection>,
}

/// Per-layer outputs; layer 0 holds the input vector
pub type Activity = Vec<Array1<f64>>;

impl Geometry {
    fn expressed(&self, cppn: &Cppn, from: [f64; 3], to: [f64; 3], buf: &mut Vec<f64>) -> [f64; 5] {
        buf.clear();
        self.encoding.encode(from, to, buf);
        let output = cppn.query(buf);
        match self.expression {
            CepExpression::SetWeight => [cep::set_weight(&output, &self.params), 0.0, 0.0, 0.0, 0.0],
            CepExpression::WeightExpression => {
                [cep::weight_expression(&output, &self.params), 0.0, 0.0, 0.0, 0.0]
            }
            CepExpression::SetAbcn => cep::set_abcn(&output, &self.params),
            // Iterative links start from zero and grow tick by tick
            CepExpression::SetIterative => [0.0; 5],
        }
    }

    /// Derive every projection from scratch.
    pub fn derive(&self, cppn: &Cppn) -> DerivedSubstrate {
        let layers = &self.layout.layers;
        let sizes = self.layout.sizes();
        let mut projections = Vec::new();

        for target in 1..layers.len() {
            for link in self.topology.sources(target, layers.len()) {
                let (n_t, n_s) = (sizes[target], sizes[link.source]);
                let rows: Vec<Vec<[f64; 5]>> = (0..n_t)
                    .into_par_iter()
                    .map(|t| {
                        let mut buf = Vec::with_capacity(self.encoding.width(true));
                        (0..n_s)
                            .map(|s| {
                                if link.diagonal && s != t {
                                    [0.0; 5]
                                } else {
                                    self.expressed(cppn, layers[link.source][s], layers[target][t], &mut buf)
                                }
                            })
                            .collect()
                    })
                    .collect();

                let mut weights = Array2::zeros((n_t, n_s));
                let mut params = (self.expression == CepExpression::SetAbcn)
                    .then(|| Array3::zeros((n_t, n_s, 4)));
                for (t, row) in rows.iter().enumerate() {
                    for (s, e) in row.iter().enumerate() {
                        weights[[t, s]] = e[0];
                        if let Some(p) = params.as_mut() {
                            for k in 0..4 {
                                p[[t, s, k]] = e[k + 1];
                            }
                        }
                    }
                }
                projections.push(Projection {
                    target,
                    source: link.source,
                    diagonal: link.diagonal,
                    weights,
                    abcn: params,
                });
            }
        }
        DerivedSubstrate { sizes, projections }
    }

    /// Ask the CPPN for a bounded delta on every live link.
    pub fn iterate(&self, derived: &mut DerivedSubstrate, cppn: &Cppn, activity: &Activity, previous: &Activity) {
        let layers = &self.layout.layers;
        let limit = self.params.sat_limit;
        for projection in derived.projections.iter_mut() {
            let input = source_activity(projection, activity, previous);
            let output = &activity[projection.target];
            let (target, source, diagonal) = (projection.target, projection.source, projection.diagonal);
            let current = &projection.weights;

            let rows: Vec<Vec<f64>> = (0..current.nrows())
                .into_par_iter()
                .map(|t| {
                    let mut buf = Vec::with_capacity(self.encoding.width(true));
                    (0..current.ncols())
                        .map(|s| {
                            let w = current[[t, s]];
                            if diagonal && s != t {
                                return w;
                            }
                            buf.clear();
                            self.encoding.encode(layers[source][s], layers[target][t], &mut buf);
                            cpp::iow(input[s], output[t], w, &mut buf);
                            let delta = cep::set_iterative(&cppn.query(&buf), &self.params);
                            (w + delta).clamp(-limit, limit)
                        })
                        .collect()
                })
                .collect();

            for (t, row) in rows.into_iter().enumerate() {
                for (s, w) in row.into_iter().enumerate() {
                    projection.weights[[t, s]] = w;
                }
            }
        }
    }
}

fn source_activity<'a>(projection: &Projection, activity: &'a Activity, previous: &'a Activity) -> &'a Array1<f64> {
    if projection.recurrent() {
        &previous[projection.source]
    } else {
        &activity[projection.source]
    }
}

impl DerivedSubstrate {
    /// All-zero activity, the state before the first tick
    pub fn rest(&self) -> Activity {
        self.sizes.iter().map(|&n| Array1::zeros(n)).collect()
    }

    /// One tick: every non-input layer is `tanh` of its summed projections.
    pub fn propagate(&self, input: &[f64], previous: &Activity) -> Activity {
        let mut activity: Activity = Vec::with_capacity(self.sizes.len());
        activity.push(Array1::from(input.to_vec()));
        for target in 1..self.sizes.len() {
            let mut sum: Array1<f64> = Array1::zeros(self.sizes[target]);
            for projection in self.projections.iter().filter(|p| p.target == target) {
                let source = source_activity(projection, &activity, previous);
                sum += &projection.weights.dot(source);
            }
            activity.push(sum.mapv(f64::tanh));
        }
        activity
    }

    /// Apply each link's ABCN rule, saturating to `±sat_limit`.
    pub fn learn_abcn(&mut self, activity: &Activity, previous: &Activity, sat_limit: f64) {
        for projection in self.projections.iter_mut() {
            let input = source_activity(projection, activity, previous);
            let output = &activity[projection.target];
            let Some(params) = projection.abcn.as_ref() else {
                continue;
            };
            let diagonal = projection.diagonal;
            Zip::indexed(&mut projection.weights).for_each(|(t, s), w| {
                if diagonal && s != t {
                    return;
                }
                let p = [params[[t, s, 0]], params[[t, s, 1]], params[[t, s, 2]], params[[t, s, 3]]];
                *w = abcn(input[s], output[t], *w, p).clamp(-sat_limit, sat_limit);
            });
        }
    }

    pub fn output<'a>(&self, activity: &'a Activity) -> &'a [f64] {
        activity
            .last()
            .and_then(|a| a.as_slice())
            .unwrap_or(&[])
    }
}
