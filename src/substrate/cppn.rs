//! Compiled CPPN.
//!
//! The pattern-producing network of a substrate agent is small and acyclic, so
//! instead of running it as a set of actors it is compiled into a topologically
//! ordered list and queried synchronously, once per link.

use crate::error::ConfigError;
use crate::genotype::{Heredity, NeuronGene, UnitId};
use crate::neural::aggregator::{dot_product, mult_product};
use crate::neural::{Activation, Aggregator, WeightSet};
use rand::Rng;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Source {
    /// The encoded coordinate vector
    Cpp,
    Node(usize),
}

#[derive(Debug, Clone)]
struct Node {
    activation: Activation,
    aggregation: Aggregator,
    sources: Vec<Source>,
    weights: WeightSet,
}

#[derive(Debug, Clone)]
pub struct Cppn {
    /// Topological order
    nodes: Vec<Node>,
    index: BTreeMap<UnitId, usize>,
    outputs: Vec<usize>,
    input_width: usize,
    genes: Vec<NeuronGene>,
}

impl Cppn {
    pub fn compile(
        genes: &[NeuronGene],
        outputs: &[UnitId],
        input_width: usize,
    ) -> Result<Self, ConfigError> {
        if genes.is_empty() {
            return Err(ConfigError::Substrate("CPPN has no neurons".to_string()));
        }
        let mut declared = BTreeMap::new();
        for (i, gene) in genes.iter().enumerate() {
            if !matches!(gene.id, UnitId::Neuron(_)) {
                return Err(ConfigError::unit(gene.id, "declared as a CPPN neuron"));
            }
            if declared.insert(gene.id, i).is_some() {
                return Err(ConfigError::DuplicateUnit(gene.id));
            }
        }
        for gene in genes {
            check_gene(gene, &declared, input_width)?;
        }

        // Place every neuron once all of its sources are placed
        let mut index: BTreeMap<UnitId, usize> = BTreeMap::new();
        let mut order: Vec<usize> = Vec::with_capacity(genes.len());
        while order.len() < genes.len() {
            let placed = order.len();
            for (i, gene) in genes.iter().enumerate() {
                if index.contains_key(&gene.id) {
                    continue;
                }
                let ready = gene
                    .inputs
                    .iter()
                    .all(|input| input.source == UnitId::Cpp || index.contains_key(&input.source));
                if ready {
                    index.insert(gene.id, order.len());
                    order.push(i);
                }
            }
            if order.len() == placed {
                let stuck = genes
                    .iter()
                    .find(|g| !index.contains_key(&g.id))
                    .map(|g| g.id.to_string())
                    .unwrap_or_default();
                return Err(ConfigError::Substrate(format!("CPPN is cyclic at {}", stuck)));
            }
        }

        let nodes = order
            .iter()
            .map(|&i| {
                let gene = &genes[i];
                Node {
                    activation: gene.activation,
                    aggregation: gene.aggregation,
                    sources: gene
                        .inputs
                        .iter()
                        .map(|input| match index.get(&input.source) {
                            Some(&k) => Source::Node(k),
                            None => Source::Cpp,
                        })
                        .collect(),
                    weights: WeightSet::from_gene(gene),
                }
            })
            .collect();

        if outputs.is_empty() {
            return Err(ConfigError::Substrate("CPPN has no outputs".to_string()));
        }
        let outputs = outputs
            .iter()
            .map(|id| {
                index.get(id).copied().ok_or(ConfigError::DanglingReference {
                    unit: UnitId::Substrate,
                    missing: *id,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            nodes,
            index,
            outputs,
            input_width,
            genes: genes.to_vec(),
        })
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn output_width(&self) -> usize {
        self.outputs.len()
    }

    pub fn ids(&self) -> Vec<UnitId> {
        self.genes.iter().map(|g| g.id).collect()
    }

    /// Evaluate the network for one encoded coordinate vector.
    pub fn query(&self, input: &[f64]) -> Vec<f64> {
        let mut values = vec![0.0; self.nodes.len()];
        for (k, node) in self.nodes.iter().enumerate() {
            let pairs: Vec<(&[f64], &[f64])> = node
                .sources
                .iter()
                .zip(&node.weights.inputs)
                .map(|(source, weights)| match source {
                    Source::Cpp => (input, weights.as_slice()),
                    Source::Node(j) => (std::slice::from_ref(&values[*j]), weights.as_slice()),
                })
                .collect();
            let aggregate = match node.aggregation {
                Aggregator::MultProduct => mult_product(&pairs, node.weights.bias),
                _ => dot_product(&pairs, node.weights.bias),
            };
            let value = node.activation.apply(aggregate);
            values[k] = value;
        }
        self.outputs.iter().map(|&k| values[k]).collect()
    }

    pub fn weights(&self, id: UnitId) -> Option<WeightSet> {
        self.index.get(&id).map(|&k| self.nodes[k].weights.clone())
    }

    /// Perturb one neuron; false if `id` is not part of this CPPN.
    pub fn perturb<R: Rng>(&mut self, id: UnitId, spread: f64, sat_limit: f64, rng: &mut R) -> bool {
        match self.index.get(&id) {
            Some(&k) => {
                self.nodes[k].weights.perturb(spread, sat_limit, rng);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<WeightSet> {
        self.nodes.iter().map(|n| n.weights.clone()).collect()
    }

    pub fn restore(&mut self, snapshot: &[WeightSet]) {
        for (node, weights) in self.nodes.iter_mut().zip(snapshot) {
            node.weights = weights.clone();
        }
    }

    /// Genes for offspring, in declaration order
    pub fn harvest(&self, heredity: Heredity) -> Vec<NeuronGene> {
        let mut genes = self.genes.clone();
        if heredity == Heredity::Lamarckian {
            for gene in &mut genes {
                if let Some(&k) = self.index.get(&gene.id) {
                    self.nodes[k].weights.write_to(gene);
                }
            }
        }
        genes
    }
}

fn check_gene(
    gene: &NeuronGene,
    declared: &BTreeMap<UnitId, usize>,
    input_width: usize,
) -> Result<(), ConfigError> {
    if gene.plasticity.is_enabled() {
        return Err(ConfigError::unit(gene.id, "CPPN neurons cannot be plastic"));
    }
    if !gene.modulatory.is_empty() {
        return Err(ConfigError::unit(gene.id, "CPPN neurons take no modulatory inputs"));
    }
    if gene.aggregation == Aggregator::DiffProduct {
        return Err(ConfigError::unit(gene.id, "CPPN neurons are stateless; diff_product is not allowed"));
    }
    if gene.inputs.is_empty() {
        return Err(ConfigError::unit(gene.id, "has no inputs"));
    }
    for input in &gene.inputs {
        if input.recurrent {
            return Err(ConfigError::unit(gene.id, "CPPN inputs cannot be recurrent"));
        }
        let expected = if input.source == UnitId::Cpp {
            input_width
        } else if declared.contains_key(&input.source) {
            1
        } else {
            return Err(ConfigError::DanglingReference {
                unit: gene.id,
                missing: input.source,
            });
        };
        if input.weights.len() != expected {
            return Err(ConfigError::WeightCount {
                unit: gene.id,
                from: input.source,
                expected,
                found: input.weights.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::{InputGene, WeightGene};
    use crate::neural::Plasticity;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn neuron(id: u32, inputs: Vec<InputGene>, activation: Activation) -> NeuronGene {
        NeuronGene {
            id: UnitId::Neuron(id),
            generation: 0,
            activation,
            aggregation: Aggregator::DotProduct,
            plasticity: Plasticity::None,
            inputs,
            bias: Some(WeightGene::new(0.5)),
            modulatory: Vec::new(),
            outputs: Vec::new(),
            recurrent_outputs: Vec::new(),
        }
    }

    /// Output neuron declared before the hidden one it reads
    fn two_layer() -> Vec<NeuronGene> {
        vec![
            neuron(2, vec![InputGene::new(UnitId::Neuron(1), vec![2.0])], Activation::Linear),
            neuron(1, vec![InputGene::new(UnitId::Cpp, vec![1.0, -1.0])], Activation::Linear),
        ]
    }

    #[test]
    fn test_query_in_topological_order() {
        let cppn = Cppn::compile(&two_layer(), &[UnitId::Neuron(2)], 2).unwrap();
        // hidden = 0.3 - 0.1 + 0.5 = 0.7; out = 2 * 0.7 + 0.5
        let out = cppn.query(&[0.3, 0.1]);
        assert_eq!(out.len(), 1);
        assert!((out[0] - 1.9).abs() < 1e-12);
        assert_eq!(cppn.ids(), vec![UnitId::Neuron(2), UnitId::Neuron(1)]);
    }

    #[test]
    fn test_rejects_cycles_and_bad_wiring() {
        let cyclic = vec![
            neuron(1, vec![InputGene::new(UnitId::Neuron(2), vec![1.0])], Activation::Tanh),
            neuron(2, vec![InputGene::new(UnitId::Neuron(1), vec![1.0])], Activation::Tanh),
        ];
        assert!(matches!(
            Cppn::compile(&cyclic, &[UnitId::Neuron(1)], 2),
            Err(ConfigError::Substrate(_))
        ));

        assert!(matches!(
            Cppn::compile(&two_layer(), &[UnitId::Neuron(2)], 3),
            Err(ConfigError::WeightCount { .. })
        ));
        assert!(matches!(
            Cppn::compile(&two_layer(), &[UnitId::Neuron(9)], 2),
            Err(ConfigError::DanglingReference { .. })
        ));

        let mut recurrent = two_layer();
        recurrent[0].inputs[0].recurrent = true;
        assert!(Cppn::compile(&recurrent, &[UnitId::Neuron(2)], 2).is_err());

        let mut plastic = two_layer();
        plastic[1].plasticity = Plasticity::Hebbian { eta: 0.1 };
        assert!(Cppn::compile(&plastic, &[UnitId::Neuron(2)], 2).is_err());
    }

    #[test]
    fn test_perturb_snapshot_restore() {
        let mut cppn = Cppn::compile(&two_layer(), &[UnitId::Neuron(2)], 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let before = cppn.query(&[0.3, 0.1]);
        let snapshot = cppn.snapshot();

        assert!(cppn.perturb(UnitId::Neuron(1), 1.0, 3.0, &mut rng));
        assert!(!cppn.perturb(UnitId::Neuron(7), 1.0, 3.0, &mut rng));
        assert_ne!(cppn.query(&[0.3, 0.1]), before);

        cppn.restore(&snapshot);
        assert_eq!(cppn.query(&[0.3, 0.1]), before);
    }

    #[test]
    fn test_harvest_heredity() {
        let mut cppn = Cppn::compile(&two_layer(), &[UnitId::Neuron(2)], 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        cppn.perturb(UnitId::Neuron(1), 1.0, 3.0, &mut rng);

        assert_eq!(cppn.harvest(Heredity::Darwinian), two_layer());
        let tuned = cppn.harvest(Heredity::Lamarckian);
        assert_eq!(Some(WeightSet::from_gene(&tuned[1])), cppn.weights(UnitId::Neuron(1)));
    }
}
