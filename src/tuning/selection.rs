//! Which units a tuning step perturbs, and by how much.
//!
//! Every policy returns `(unit id, spread)` pairs. The spread is the width of
//! the uniform noise a unit applies to each of its weights.

use crate::error::ConfigError;
use crate::genotype::UnitId;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

/// Units older than this many generations are no longer "active"
pub const ACTIVE_AGE_LIMIT: u32 = 3;

/// A unit eligible for perturbation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: UnitId,
    /// Generation the unit was created in
    pub generation: u32,
    /// Number of tunable weights the unit carries
    pub weights: usize,
}

impl Candidate {
    pub fn age(&self, generation: u32) -> u32 {
        generation.saturating_sub(self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningSelection {
    All,
    AllRandom,
    Current,
    CurrentRandom,
    Active,
    ActiveRandom,
    Dynamic,
    #[default]
    DynamicRandom,
}

impl TuningSelection {
    pub fn select<R: Rng>(
        self,
        candidates: &[Candidate],
        generation: u32,
        parameter: f64,
        spread: f64,
        rng: &mut R,
    ) -> Vec<(UnitId, f64)> {
        match self {
            TuningSelection::All => all(candidates, spread),
            TuningSelection::AllRandom => pick_one(all(candidates, spread), rng),
            TuningSelection::Current => current(candidates, generation, spread),
            TuningSelection::CurrentRandom => pick_one(current(candidates, generation, spread), rng),
            TuningSelection::Active => active(candidates, generation, spread),
            TuningSelection::ActiveRandom => pick_one(active(candidates, generation, spread), rng),
            TuningSelection::Dynamic => dynamic(candidates, generation, parameter, spread),
            TuningSelection::DynamicRandom => {
                thin_out(dynamic(candidates, generation, parameter, spread), rng)
            }
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            TuningSelection::All => "all",
            TuningSelection::AllRandom => "all_random",
            TuningSelection::Current => "current",
            TuningSelection::CurrentRandom => "current_random",
            TuningSelection::Active => "active",
            TuningSelection::ActiveRandom => "active_random",
            TuningSelection::Dynamic => "dynamic",
            TuningSelection::DynamicRandom => "dynamic_random",
        }
    }
}

impl FromStr for TuningSelection {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        [
            TuningSelection::All,
            TuningSelection::AllRandom,
            TuningSelection::Current,
            TuningSelection::CurrentRandom,
            TuningSelection::Active,
            TuningSelection::ActiveRandom,
            TuningSelection::Dynamic,
            TuningSelection::DynamicRandom,
        ]
        .into_iter()
        .find(|s| s.tag() == tag)
        .ok_or_else(|| ConfigError::UnknownTag {
            kind: "tuning selection",
            tag: tag.to_string(),
        })
    }
}

fn annotate<'a>(candidates: impl Iterator<Item = &'a Candidate>, spread: f64) -> Vec<(UnitId, f64)> {
    candidates.map(|c| (c.id, spread)).collect()
}

/// Every candidate, spread `2π × spread`
pub fn all(candidates: &[Candidate], spread: f64) -> Vec<(UnitId, f64)> {
    annotate(candidates.iter(), 2.0 * PI * spread)
}

/// Candidates created in the present generation
pub fn current(candidates: &[Candidate], generation: u32, spread: f64) -> Vec<(UnitId, f64)> {
    annotate(
        candidates.iter().filter(|c| c.age(generation) == 0),
        2.0 * PI * spread,
    )
}

/// Candidates younger than [`ACTIVE_AGE_LIMIT`]; nothing once the generation
/// counter itself has passed the limit.
pub fn active(candidates: &[Candidate], generation: u32, spread: f64) -> Vec<(UnitId, f64)> {
    if generation > ACTIVE_AGE_LIMIT {
        return Vec::new();
    }
    annotate(
        candidates.iter().filter(|c| c.age(generation) < ACTIVE_AGE_LIMIT),
        2.0 * PI * spread,
    )
}

/// Candidates no older than `parameter` generations, youngest first.
///
/// Falls back to the single youngest candidate when none qualifies. A spread of
/// exactly `1.0` selects `π`, anything else `2π`.
pub fn dynamic(
    candidates: &[Candidate],
    generation: u32,
    parameter: f64,
    spread: f64,
) -> Vec<(UnitId, f64)> {
    let annotated = if spread == 1.0 { PI } else { 2.0 * PI };

    let mut sorted: Vec<&Candidate> = candidates.iter().collect();
    sorted.sort_by_key(|c| (c.age(generation), c.id));

    let horizon = parameter.max(0.0);
    let young: Vec<&Candidate> = sorted
        .iter()
        .copied()
        .filter(|c| f64::from(c.age(generation)) <= horizon)
        .collect();

    if young.is_empty() {
        return annotate(sorted.into_iter().take(1), annotated);
    }
    annotate(young.into_iter(), annotated)
}

fn pick_one<R: Rng>(selection: Vec<(UnitId, f64)>, rng: &mut R) -> Vec<(UnitId, f64)> {
    selection.choose(rng).copied().into_iter().collect()
}

/// Keep each unit with probability `1/sqrt(n)`; never return an empty set
/// from a non-empty one.
fn thin_out<R: Rng>(selection: Vec<(UnitId, f64)>, rng: &mut R) -> Vec<(UnitId, f64)> {
    if selection.is_empty() {
        return selection;
    }
    let p = 1.0 / (selection.len() as f64).sqrt();
    let kept: Vec<(UnitId, f64)> = selection
        .iter()
        .copied()
        .filter(|_| rng.gen::<f64>() < p)
        .collect();
    if kept.is_empty() {
        pick_one(selection, rng)
    } else {
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate { id: UnitId::Neuron(1), generation: 0, weights: 3 },
            Candidate { id: UnitId::Neuron(2), generation: 2, weights: 2 },
            Candidate { id: UnitId::Neuron(3), generation: 4, weights: 5 },
            Candidate { id: UnitId::Neuron(4), generation: 4, weights: 1 },
        ]
    }

    #[test]
    fn test_dynamic_spread_sentinel() {
        let c = candidates();
        let exact = dynamic(&c, 4, 10.0, 1.0);
        assert!(exact.iter().all(|(_, s)| *s == PI));

        let other = dynamic(&c, 4, 10.0, 0.5);
        assert!(other.iter().all(|(_, s)| *s == 2.0 * PI));
        let near = dynamic(&c, 4, 10.0, 1.0 + 1e-9);
        assert!(near.iter().all(|(_, s)| *s == 2.0 * PI));
    }

    #[test]
    fn test_dynamic_orders_by_age_and_falls_back() {
        let c = candidates();
        let ids: Vec<UnitId> = dynamic(&c, 4, 2.0, 1.0).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![UnitId::Neuron(3), UnitId::Neuron(4), UnitId::Neuron(2)]);

        // Nobody is that young: keep the youngest only
        let ids: Vec<UnitId> = dynamic(&c, 10, 1.0, 1.0).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![UnitId::Neuron(3)]);
    }

    #[test]
    fn test_active_empty_past_threshold() {
        let c = candidates();
        assert!(active(&c, 5, 1.0).is_empty());
        assert!(TuningSelection::Active
            .select(&c, 5, 0.0, 1.0, &mut ChaCha8Rng::seed_from_u64(1))
            .is_empty());

        // Ages at generation 3 are 3, 1, 0, 0
        let young = active(&c, 3, 1.0);
        assert_eq!(young.len(), 3);
        assert!(young.iter().all(|(_, s)| (*s - 2.0 * PI).abs() < 1e-12));
    }

    #[test]
    fn test_all_and_current() {
        let c = candidates();
        let every = all(&c, 0.5);
        assert_eq!(every.len(), 4);
        assert!(every.iter().all(|(_, s)| (*s - PI).abs() < 1e-12));

        let now: Vec<UnitId> = current(&c, 4, 1.0).into_iter().map(|(id, _)| id).collect();
        assert_eq!(now, vec![UnitId::Neuron(3), UnitId::Neuron(4)]);
        assert!(current(&c, 5, 1.0).is_empty());
    }

    #[test]
    fn test_random_variants_pick_from_base_policy() {
        let c = candidates();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let one = TuningSelection::AllRandom.select(&c, 4, 0.0, 1.0, &mut rng);
            assert_eq!(one.len(), 1);

            let cur = TuningSelection::CurrentRandom.select(&c, 4, 0.0, 1.0, &mut rng);
            assert_eq!(cur.len(), 1);
            assert!(matches!(cur[0].0, UnitId::Neuron(3) | UnitId::Neuron(4)));

            let dynamic = TuningSelection::DynamicRandom.select(&c, 4, 10.0, 1.0, &mut rng);
            assert!(!dynamic.is_empty() && dynamic.len() <= 4);
        }
        assert!(TuningSelection::AllRandom
            .select(&[], 0, 0.0, 1.0, &mut rng)
            .is_empty());
    }

    #[test]
    fn test_tags_roundtrip() {
        for tag in ["all", "current_random", "active", "dynamic_random"] {
            assert_eq!(tag.parse::<TuningSelection>().unwrap().tag(), tag);
        }
        assert!("sideways".parse::<TuningSelection>().is_err());
    }
}
