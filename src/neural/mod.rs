//! Neuron-level building blocks.
//!
//! - Activation functions
//! - Signal aggregation
//! - Lifetime plasticity rules
//! - The neuron actor itself

pub mod activation;
pub mod aggregator;
pub mod neuron;
pub mod plasticity;

pub use activation::Activation;
pub use aggregator::{Aggregator, AggregatorMemory};
pub use neuron::{Flow, Neuron, WeightSet};
pub use plasticity::{abcn, Plasticity};
