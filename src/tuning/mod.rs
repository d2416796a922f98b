//! Weight tuning: the local search run between structural mutations.
//!
//! Selection and duration policies are pure functions; the driver applies them
//! to a live [`AgentNetwork`](crate::agent::AgentNetwork).

pub mod driver;
pub mod duration;
pub mod selection;

pub use driver::{Tuner, TuningOutcome};
pub use duration::TuningDuration;
pub use selection::{Candidate, TuningSelection, ACTIVE_AGE_LIMIT};
