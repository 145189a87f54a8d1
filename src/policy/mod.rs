//! Decision policies over the source-tracking environment.
//!
//! Every policy satisfies the same narrow contract — read the environment's
//! belief and position, return the next action — via [`DecisionPolicy`].
//! Policies never mutate the environment; simulation goes through the pure
//! preview primitives.

pub mod alpha;
pub mod heuristics;
pub mod lookahead;

use serde::{Deserialize, Serialize};

use crate::{env::SourceTracking, error::Result};

pub use alpha::{AlphaVectorDocument, AlphaVectorPolicy};
pub use heuristics::{
    Greedy, Infotaxis, MeanDistance, MostLikelyState, POverD, RandomWalk, SpaceAwareInfotaxis,
    Voting,
};
pub use lookahead::{Decision, InfotaxisLookahead};

/// Tolerance for treating two action scores as tied.
pub const EPSILON_CHOICE: f64 = crate::EPSILON;

/// The policy contract: belief + position in, action out.
pub trait DecisionPolicy {
    /// Human-readable policy name.
    fn name(&self) -> &str;

    /// Choose the next action for the environment's current state.
    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize>;

    /// Per-action diagnostic scores from the last or a fresh evaluation, in
    /// the policy's own scale. None for policies without meaningful scores.
    fn action_scores(&mut self, _env: &SourceTracking) -> Result<Option<Vec<f64>>> {
        Ok(None)
    }
}

/// Registry of the named one-step policy variants.
///
/// Lookahead and alpha-vector policies carry extra construction parameters
/// and are built explicitly instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Infotaxis,
    SpaceAwareInfotaxis,
    Greedy,
    MeanDistance,
    POverD,
    RandomWalk,
    Voting,
    MostLikelyState,
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Infotaxis => "infotaxis",
            PolicyKind::SpaceAwareInfotaxis => "space-aware infotaxis",
            PolicyKind::Greedy => "greedy",
            PolicyKind::MeanDistance => "mean distance",
            PolicyKind::POverD => "p-over-d",
            PolicyKind::RandomWalk => "random walk",
            PolicyKind::Voting => "voting",
            PolicyKind::MostLikelyState => "most likely state",
        }
    }

    /// Instantiate the policy; `seed` only matters for the random walk.
    pub fn build(&self, seed: Option<u64>) -> Box<dyn DecisionPolicy> {
        match self {
            PolicyKind::Infotaxis => Box::new(Infotaxis::new()),
            PolicyKind::SpaceAwareInfotaxis => Box::new(SpaceAwareInfotaxis::new()),
            PolicyKind::Greedy => Box::new(Greedy::new()),
            PolicyKind::MeanDistance => Box::new(MeanDistance::new()),
            PolicyKind::POverD => Box::new(POverD::new()),
            PolicyKind::RandomWalk => Box::new(RandomWalk::new(seed)),
            PolicyKind::Voting => Box::new(Voting::new()),
            PolicyKind::MostLikelyState => Box::new(MostLikelyState::new()),
        }
    }
}
