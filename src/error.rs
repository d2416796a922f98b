//! Error types for instantiation and actor runtime failures.

use crate::genotype::UnitId;
use thiserror::Error;

/// Invalid configuration or genotype, detected before any actor is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown {kind} tag `{tag}`")]
    UnknownTag { kind: &'static str, tag: String },

    #[error("unit {0} is declared more than once")]
    DuplicateUnit(UnitId),

    #[error("unit {unit} references unknown unit {missing}")]
    DanglingReference { unit: UnitId, missing: UnitId },

    #[error("unit {unit} expects {expected} weights from {from}, found {found}")]
    WeightCount {
        unit: UnitId,
        from: UnitId,
        expected: usize,
        found: usize,
    },

    #[error("unit {unit}: {reason}")]
    InvalidUnit { unit: UnitId, reason: String },

    #[error("invalid substrate: {0}")]
    Substrate(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub(crate) fn unit(unit: UnitId, reason: impl Into<String>) -> Self {
        Self::InvalidUnit {
            unit,
            reason: reason.into(),
        }
    }
}

/// Failures talking to running actors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unit {0} is not part of this agent")]
    UnknownUnit(UnitId),

    #[error("channel to {0} is closed")]
    Disconnected(String),

    #[error("failed to spawn {unit}: {source}")]
    Spawn {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    #[error("actor thread {0} panicked")]
    Panicked(String),

    #[error("environment host is unavailable")]
    EnvironmentGone,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
