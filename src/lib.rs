//! Source-tracking POMDP: an agent localizes an emission source on a grid
//! from noisy hit counts.
//!
//! The environment maintains an exact Bayesian belief over source locations.
//! Each step the agent moves one cell, receives a stochastic hit count drawn
//! from a turbulence-derived detection model, and folds the corresponding
//! likelihood into its belief. The episode ends when the belief collapses
//! onto a single cell.
//!
//! The crate provides:
//!
//! - [`SourceTracking`]: the environment with exact belief updates,
//!   belief-driven or ground-truth observations, and transition previews;
//! - [`HitKernel`]: the translation-invariant Poisson detection model;
//! - one-step heuristic policies (infotaxis and friends) in
//!   [`policy::heuristics`];
//! - an exact n-step lookahead planner, [`InfotaxisLookahead`];
//! - an externally trained alpha-vector policy, [`AlphaVectorPolicy`].
//!
//! # Example
//!
//! ```no_run
//! use sourcetrack::{DecisionPolicy, EnvConfig, Infotaxis, SourceTracking};
//!
//! # fn main() -> sourcetrack::Result<()> {
//! let mut env = SourceTracking::new(EnvConfig::default().with_seed(42))?;
//! let mut policy = Infotaxis::new();
//! while !env.done() {
//!     let action = policy.choose_action(&env)?;
//!     env.step(action, None, false)?;
//! }
//! println!("source located at {:?}", env.agent());
//! # Ok(())
//! # }
//! ```

pub mod belief;
pub mod config;
pub mod env;
pub mod error;
pub mod grid;
pub mod kernel;
pub mod policy;
pub mod utils;

/// Numerical tolerance used throughout: probability floors, terminal-state
/// detection, normalization checks and score ties.
pub const EPSILON: f64 = 1e-10;

pub use belief::Belief;
pub use config::EnvConfig;
pub use env::{OutcomePreview, SourceTracking, StepOutcome, TransitionPreview};
pub use error::{Error, Result};
pub use grid::{Grid, Norm, Position};
pub use kernel::HitKernel;
pub use policy::{
    AlphaVectorDocument, AlphaVectorPolicy, Decision, DecisionPolicy, Infotaxis,
    InfotaxisLookahead, PolicyKind,
};
