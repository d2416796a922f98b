//! Which layers feed which.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTopology {
    /// Each layer reads the one before it
    #[default]
    L2lFeedforward,
    /// Each non-input layer reads every layer, itself included
    FullyInterconnected,
    /// Feedforward, plus the output layer feeding the first hidden layer
    JordanRecurrent,
    /// Feedforward, plus every unit feeding itself
    NeuronselfRecurrent,
}

/// One source feeding a target layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub source: usize,
    /// Only `i -> i` pairs are connected
    pub diagonal: bool,
}

impl LinkTopology {
    /// Sources of `target` in a stack of `layers` layers (input is layer 0).
    pub fn sources(self, target: usize, layers: usize) -> Vec<Link> {
        if target == 0 || target >= layers {
            return Vec::new();
        }
        let previous = Link {
            source: target - 1,
            diagonal: false,
        };
        match self {
            LinkTopology::L2lFeedforward => vec![previous],
            LinkTopology::FullyInterconnected => (0..layers)
                .map(|source| Link {
                    source,
                    diagonal: false,
                })
                .collect(),
            LinkTopology::JordanRecurrent => {
                let mut links = vec![previous];
                if target == 1 {
                    links.push(Link {
                        source: layers - 1,
                        diagonal: false,
                    });
                }
                links
            }
            LinkTopology::NeuronselfRecurrent => vec![
                previous,
                Link {
                    source: target,
                    diagonal: true,
                },
            ],
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            LinkTopology::L2lFeedforward => "l2l_feedforward",
            LinkTopology::FullyInterconnected => "fully_interconnected",
            LinkTopology::JordanRecurrent => "jordan_recurrent",
            LinkTopology::NeuronselfRecurrent => "neuronself_recurrent",
        }
    }
}

impl FromStr for LinkTopology {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "l2l_feedforward" => Ok(LinkTopology::L2lFeedforward),
            "fully_interconnected" => Ok(LinkTopology::FullyInterconnected),
            "jordan_recurrent" => Ok(LinkTopology::JordanRecurrent),
            "neuronself_recurrent" => Ok(LinkTopology::NeuronselfRecurrent),
            other => Err(ConfigError::UnknownTag {
                kind: "link topology",
                tag: other.to_string(),
            }),
        }
    }
}
