//! How many consecutive non-improving attempts a tuning phase may make.

use super::selection::{Candidate, ACTIVE_AGE_LIMIT};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const WSIZE_BASE: u32 = 10;
const NSIZE_BASE: u32 = 20;
const PROPORTIONAL_CAP: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningDuration {
    Const,
    #[default]
    WsizeProportional,
    NsizeProportional,
}

impl TuningDuration {
    /// Attempt budget for one tuning phase.
    ///
    /// The proportional policies only count units younger than
    /// [`ACTIVE_AGE_LIMIT`] generations, the same units `active` selects.
    pub fn attempts(self, parameter: f64, candidates: &[Candidate], generation: u32) -> u32 {
        match self {
            TuningDuration::Const => parameter.round().max(0.0) as u32,
            TuningDuration::WsizeProportional => {
                let weights: usize = recent(candidates, generation).map(|c| c.weights).sum();
                WSIZE_BASE + proportional(parameter, weights)
            }
            TuningDuration::NsizeProportional => {
                let units = recent(candidates, generation).count();
                NSIZE_BASE + proportional(parameter, units)
            }
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            TuningDuration::Const => "const",
            TuningDuration::WsizeProportional => "wsize_proportional",
            TuningDuration::NsizeProportional => "nsize_proportional",
        }
    }
}

impl FromStr for TuningDuration {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "const" => Ok(TuningDuration::Const),
            "wsize_proportional" => Ok(TuningDuration::WsizeProportional),
            "nsize_proportional" => Ok(TuningDuration::NsizeProportional),
            other => Err(ConfigError::UnknownTag {
                kind: "tuning duration",
                tag: other.to_string(),
            }),
        }
    }
}

fn recent(candidates: &[Candidate], generation: u32) -> impl Iterator<Item = &Candidate> {
    candidates
        .iter()
        .filter(move |c| c.age(generation) < ACTIVE_AGE_LIMIT)
}

fn proportional(parameter: f64, size: usize) -> u32 {
    (parameter * (size as f64).sqrt())
        .round()
        .clamp(0.0, PROPORTIONAL_CAP) as u32
}
