//! Configuration for the agent runtime.
//!
//! Supports YAML configuration files with sensible defaults.

use crate::error::ConfigError;
use crate::tuning::{TuningDuration, TuningSelection};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub substrate: SubstrateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Actor runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Synaptic weights are saturated to `[-sat_limit, sat_limit]`
    pub sat_limit: f64,
    /// Seed for the per-unit perturbation generators (None = entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Local-search (weight tuning) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Which units a tuning step may perturb
    pub selection: TuningSelection,
    /// Policy parameter handed to the selection policy
    pub selection_parameter: f64,
    /// How many attempts a tuning phase is allotted
    pub duration: TuningDuration,
    /// Constant handed to the duration policy
    pub duration_parameter: f64,
    /// Spread multiplier handed to the selection policy
    pub perturbation_range: f64,
    /// Hard cap on the attempt budget
    pub max_attempts_cap: u32,
}

/// Geometry-to-weight mapping settings for substrate agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstrateConfig {
    /// Dead zone for connectivity expression outputs
    pub weight_threshold: f64,
    /// Bound for saturating and iterative expressions
    pub sat_limit: f64,
    /// Largest single step an iterative expression may apply
    pub max_delta: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sat_limit: 2.0 * PI,
            seed: None,
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            selection: TuningSelection::DynamicRandom,
            selection_parameter: 3.0,
            duration: TuningDuration::WsizeProportional,
            duration_parameter: 0.5,
            perturbation_range: 1.0,
            max_attempts_cap: 200,
        }
    }
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            weight_threshold: 0.33,
            sat_limit: 3.0,
            max_delta: 0.1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.runtime.sat_limit.is_finite() && self.runtime.sat_limit > 0.0) {
            return Err(ConfigError::Invalid("runtime.sat_limit must be > 0".to_string()));
        }
        if self.tuning.perturbation_range <= 0.0 {
            return Err(ConfigError::Invalid(
                "tuning.perturbation_range must be > 0".to_string(),
            ));
        }
        if self.tuning.max_attempts_cap == 0 {
            return Err(ConfigError::Invalid(
                "tuning.max_attempts_cap must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.substrate.weight_threshold) {
            return Err(ConfigError::Invalid(
                "substrate.weight_threshold must be in [0, 1)".to_string(),
            ));
        }
        if self.substrate.sat_limit <= 0.0 || self.substrate.max_delta <= 0.0 {
            return Err(ConfigError::Invalid(
                "substrate.sat_limit and substrate.max_delta must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let loaded: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.tuning.selection, loaded.tuning.selection);
        assert_eq!(config.substrate.weight_threshold, loaded.substrate.weight_threshold);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "runtime:\n  sat_limit: 1.5\n  seed: 7\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.runtime.seed, Some(7));
        assert_eq!(config.tuning.max_attempts_cap, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_selection_tag_rejected() {
        let yaml = "tuning:\n  selection: sideways\n  selection_parameter: 1.0\n  duration: const\n  duration_parameter: 5.0\n  perturbation_range: 1.0\n  max_attempts_cap: 10\n";
        let parsed: Result<Config, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = Config::default();
        config.substrate.weight_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
