//! The running agent: sensors, actuators, the cortex and their wiring.
//!
//! Every unit is a thread that owns its state and reacts to messages on a
//! single inbox. [`AgentNetwork`] builds an agent from a
//! [`Genotype`](crate::genotype::Genotype) and exposes the between-episode
//! lifecycle calls.

pub mod actuator;
pub mod cortex;
pub mod environment;
pub mod network;
pub mod registry;
pub mod sensor;

pub use actuator::Actuator;
pub use cortex::{Cortex, CortexState};
pub use environment::{Environment, EnvironmentHost, EnvironmentRef};
pub use network::AgentNetwork;
pub use registry::Registry;
pub use sensor::Sensor;
