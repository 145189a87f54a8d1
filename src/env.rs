//! The source-tracking POMDP environment.
//!
//! Owns the belief, the agent position and the hit history; executes moves,
//! samples or validates observations, and performs the exact Bayesian belief
//! update. Policies hold a shared reference and only ever call the read
//! accessors and the pure [`SourceTracking::preview_transition`]; `step` is
//! the single mutator.

use log::{debug, warn};
use ndarray::Array2;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    EPSILON,
    belief::Belief,
    config::EnvConfig,
    error::{Error, Result},
    grid::{Grid, Position},
    kernel::HitKernel,
    utils::sample_categorical,
};

/// Result of one executed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Observed hit value in `[0, nhits)`, or None on a terminal step.
    pub hit: Option<usize>,
    /// Belief mass at the destination cell before it was cleared.
    pub p_end: f64,
    /// Whether the source has been localized.
    pub done: bool,
}

/// Pure preview of the transition a candidate action would induce.
///
/// Identical math to [`SourceTracking::step`] without randomness or
/// mutation. When the move is blocked or the destination already holds
/// nearly all the mass, `outcomes` is empty.
#[derive(Debug, Clone)]
pub struct TransitionPreview {
    pub destination: Position,
    pub allowed: bool,
    pub p_end: f64,
    /// Destination holds ≥ 1−ε of the mass: stepping there ends the search.
    pub forces_terminal: bool,
    pub outcomes: Vec<OutcomePreview>,
}

/// One hit outcome inside a [`TransitionPreview`].
#[derive(Debug, Clone)]
pub struct OutcomePreview {
    /// Probability of observing this hit value.
    pub p_hit: f64,
    /// Posterior belief conditioned on the hit.
    pub belief: Belief,
    /// Entropy of the posterior, in bits.
    pub entropy: f64,
}

/// Apply an action to a position without touching any state.
///
/// Actions encode axis `action / 2` and direction `±1` from `action % 2`;
/// index `2·dim` is "stay" when enabled. Motion exiting the grid is rejected
/// as a normal no-op (`allowed = false`); an index outside the enumeration
/// is a programming error and fails fast with [`Error::InvalidAction`].
pub fn apply_action(
    grid: &Grid,
    allow_stay: bool,
    action: usize,
    position: Position,
) -> Result<(Position, bool)> {
    let limit = 2 * grid.ndim() + usize::from(allow_stay);
    if action >= limit {
        return Err(Error::InvalidAction { action, limit });
    }
    if action == 2 * grid.ndim() {
        return Ok((position, true)); // stay
    }
    let axis = action / 2;
    let positive = action % 2 == 1;
    let mut next = position;
    let allowed = if positive {
        if position[axis] < grid.shape()[axis] - 1 {
            next[axis] += 1;
            true
        } else {
            false
        }
    } else if position[axis] > 0 {
        next[axis] -= 1;
        true
    } else {
        false
    };
    Ok((if allowed { next } else { position }, allowed))
}

/// Preview the exact Bayesian transition for one candidate action.
///
/// Free function over the environment's immutable parts so the numeric core
/// can be exercised with hand-built kernels and beliefs.
pub fn preview_transition(
    grid: &Grid,
    kernel: &HitKernel,
    belief: &Belief,
    position: Position,
    action: usize,
    allow_stay: bool,
) -> Result<TransitionPreview> {
    let (destination, allowed) = apply_action(grid, allow_stay, action, position)?;
    if !allowed {
        return Ok(TransitionPreview {
            destination,
            allowed,
            p_end: 0.0,
            forces_terminal: false,
            outcomes: Vec::new(),
        });
    }

    let p_end = belief.value_at(destination);
    if p_end > 1.0 - EPSILON {
        return Ok(TransitionPreview {
            destination,
            allowed,
            p_end,
            forces_terminal: true,
            outcomes: Vec::new(),
        });
    }

    let mut conditioned = belief.clone();
    conditioned.zero_at(destination);
    conditioned.renormalize();

    let windows = kernel.window(destination)?;
    let outcomes = windows
        .iter()
        .map(|window| {
            let (posterior, p_hit) = conditioned.posterior(window);
            let entropy = posterior.entropy();
            OutcomePreview {
                p_hit,
                belief: posterior,
                entropy,
            }
        })
        .collect();

    Ok(TransitionPreview {
        destination,
        allowed,
        p_end,
        forces_terminal: false,
        outcomes,
    })
}

/// Environment used to simulate the source-tracking POMDP.
#[derive(Debug, Clone)]
pub struct SourceTracking {
    config: EnvConfig,
    grid: Grid,
    kernel: HitKernel,
    belief: Belief,
    entropy: f64,
    agent: Position,
    source: Option<Position>,
    hit_map: Array2<Option<u8>>,
    cumulative_hits: u64,
    near_boundaries: bool,
    last_hit: Option<usize>,
    done: bool,
    // Positions one and two steps ago; kept for the (disabled) stuck check.
    previous: Position,
    previous2: Position,
    rng: StdRng,
}

impl SourceTracking {
    /// Build the environment: derives the kernel once, seeds the RNG, and
    /// restarts into the initial belief.
    pub fn new(config: EnvConfig) -> Result<Self> {
        let kernel = Self::kernel_for(&config)?;
        Self::with_kernel(config, kernel)
    }

    /// Build with an explicitly provided kernel (hand-built models, tests).
    pub fn with_kernel(config: EnvConfig, kernel: HitKernel) -> Result<Self> {
        config.validate()?;
        let grid = Grid::from_shape(&config.shape)?;
        if kernel.nhits() != config.nhits {
            return Err(Error::config(format!(
                "kernel has {} hit buckets, config expects {}",
                kernel.nhits(),
                config.nhits
            )));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let start = config.start_cell();
        let mut env = Self {
            belief: Belief::uniform_excluding(&grid, start),
            entropy: 0.0,
            agent: start,
            source: None,
            hit_map: Array2::from_elem((grid.width(), grid.height()), None),
            cumulative_hits: 0,
            near_boundaries: false,
            last_hit: None,
            done: false,
            previous: start,
            previous2: start,
            config,
            grid,
            kernel,
            rng,
        };
        env.restart()?;
        Ok(env)
    }

    fn kernel_for(config: &EnvConfig) -> Result<HitKernel> {
        config.validate()?;
        let grid = Grid::from_shape(&config.shape)?;
        HitKernel::build(
            &grid,
            config.nhits,
            config.emission_rate,
            config.wind_speed,
            config.coherence_time,
            config.norm,
        )
    }

    /// Restart the search: agent back to the start cell, belief uniform over
    /// every other cell, then the mandatory initial observation is folded in
    /// with the same Bayesian update as `step`.
    pub fn restart(&mut self) -> Result<()> {
        self.agent = self.config.start_cell();
        self.belief = Belief::uniform_excluding(&self.grid, self.agent);
        self.hit_map.fill(None);
        self.done = false;
        self.near_boundaries = self.is_near_boundaries(1);
        self.previous = self.agent;
        self.previous2 = self.agent;

        self.apply_observation(Some(self.config.initial_hit), false)?;
        self.last_hit = Some(self.config.initial_hit);
        self.cumulative_hits = 0; // the mandatory initial hit does not count

        self.source = if self.config.draw_source {
            Some(self.draw_source())
        } else {
            None
        };
        debug!(
            "restart: agent {:?}, entropy {:.4} bits, source {:?}",
            self.agent, self.entropy, self.source
        );
        Ok(())
    }

    fn draw_source(&mut self) -> Position {
        let flat: Vec<f64> = self.belief.view().iter().copied().collect();
        let index =
            sample_categorical(&mut self.rng, &flat).expect("belief has at least one cell");
        [index / self.grid.height(), index % self.grid.height()]
    }

    /// Move a position according to `action`; see [`apply_action`].
    pub fn move_agent(&self, action: usize, position: Position) -> Result<(Position, bool)> {
        apply_action(&self.grid, self.config.allow_stay, action, position)
    }

    /// Pure preview of the transition `action` would induce from the current
    /// belief and position; never mutates the environment.
    pub fn preview_transition(&self, action: usize) -> Result<TransitionPreview> {
        preview_transition(
            &self.grid,
            &self.kernel,
            &self.belief,
            self.agent,
            action,
            self.config.allow_stay,
        )
    }

    /// Make a step in the environment:
    ///
    /// 1. The agent moves according to `action` (boundary-blocked moves are
    ///    no-ops, logged unless `quiet`).
    /// 2. An observation is sampled — from the true source distance in
    ///    ground-truth mode, from the belief-folded hit probabilities
    ///    otherwise — or taken from `forced_hit`.
    /// 3. The belief, hit map and entropy are updated.
    pub fn step(
        &mut self,
        action: usize,
        forced_hit: Option<usize>,
        quiet: bool,
    ) -> Result<StepOutcome> {
        if let Some(hit) = forced_hit
            && hit >= self.kernel.nhits()
        {
            return Err(Error::config(format!(
                "forced hit {hit} is outside the {} buckets",
                self.kernel.nhits()
            )));
        }

        self.previous2 = self.previous;
        self.previous = self.agent;

        let (destination, allowed) = self.move_agent(action, self.agent)?;
        self.agent = destination;
        if !allowed && !quiet {
            warn!(
                "blocked move: agent at {:?} cannot take action {action}",
                self.agent
            );
        }
        self.near_boundaries = self.is_near_boundaries(1);

        let (hit, p_end, done) = if self.source.is_some() {
            self.observe_from_source(forced_hit)?
        } else {
            self.observe_from_belief(forced_hit)?
        };

        if !done {
            self.cumulative_hits += hit.expect("non-terminal steps observe a hit") as u64;
        }
        self.apply_observation(hit, done)?;
        self.last_hit = hit;
        self.done = done;
        if done {
            debug!("source localized at {:?} (p_end {p_end:.6})", self.agent);
        }

        Ok(StepOutcome { hit, p_end, done })
    }

    /// Ground-truth mode: sample the observation from the drawn source.
    fn observe_from_source(
        &mut self,
        forced_hit: Option<usize>,
    ) -> Result<(Option<usize>, f64, bool)> {
        let source = self.source.expect("ground-truth mode has a source");
        let offset = [
            self.agent[0] as i64 - source[0] as i64,
            self.agent[1] as i64 - source[1] as i64,
        ];
        let distance = self.config.norm.length(offset);
        if distance <= EPSILON {
            return Ok((None, 1.0, true));
        }
        let x = self.agent[0] as f64 - source[0] as f64;
        let probabilities = self.kernel.hit_distribution(distance, x)?;
        let hit = match forced_hit {
            Some(hit) => hit,
            None => sample_categorical(&mut self.rng, &probabilities)
                .expect("hit distribution is non-empty"),
        };
        Ok((Some(hit), 0.0, false))
    }

    /// Bayesian mode: fold the kernel window against the belief.
    fn observe_from_belief(
        &mut self,
        forced_hit: Option<usize>,
    ) -> Result<(Option<usize>, f64, bool)> {
        let p_end = self.belief.value_at(self.agent);
        let mut done = p_end > 1.0 - EPSILON;

        // The source is not at the agent's cell; the leftover mass decides
        // between a normal update and certain localization.
        let mut conditioned = self.belief.clone();
        conditioned.zero_at(self.agent);
        if conditioned.renormalize() <= EPSILON {
            done = true;
        }
        if done {
            return Ok((None, p_end, true));
        }

        let windows = self.kernel.window(self.agent)?;
        let mut p_hit: Vec<f64> = windows
            .iter()
            .map(|window| conditioned.expect(window).max(0.0))
            .collect();
        let sum: f64 = p_hit.iter().sum();
        if (sum - 1.0).abs() >= EPSILON {
            return Err(Error::LikelihoodInconsistency { sum });
        }
        for value in p_hit.iter_mut() {
            *value /= sum;
        }

        let hit = match forced_hit {
            Some(hit) => hit,
            None => {
                sample_categorical(&mut self.rng, &p_hit).expect("hit probabilities non-empty")
            }
        };
        Ok((Some(hit), p_end, false))
    }

    /// Shared belief/hit-map update for `restart` and `step`.
    fn apply_observation(&mut self, hit: Option<usize>, done: bool) -> Result<()> {
        if let Some(hit) = hit {
            self.hit_map[self.agent] = Some(hit as u8);
        }
        if done {
            self.belief.collapse_to(self.agent);
            self.entropy = 0.0;
            return Ok(());
        }
        let hit = hit.expect("non-terminal updates observe a hit");
        self.belief.zero_at(self.agent);
        let windows = self.kernel.window(self.agent)?;
        self.belief.fold_likelihood(&windows[hit]);
        self.entropy = self.belief.entropy();
        Ok(())
    }

    fn is_near_boundaries(&self, margin: usize) -> bool {
        (0..2).any(|axis| {
            self.agent[axis] <= margin || self.agent[axis] >= self.grid.shape()[axis] - 1 - margin
        })
    }

    // __ read accessors ______________________________________________

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn kernel(&self) -> &HitKernel {
        &self.kernel
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Read-only view of the posterior over source locations.
    pub fn belief(&self) -> &Belief {
        &self.belief
    }

    /// Entropy of the belief in bits; 0 only for degenerate beliefs.
    pub fn entropy(&self) -> f64 {
        self.entropy
    }

    pub fn agent(&self) -> Position {
        self.agent
    }

    /// Drawn source location (ground-truth mode only).
    pub fn source(&self) -> Option<Position> {
        self.source
    }

    /// Last observed hit per cell; None for unvisited cells. Diagnostic
    /// only, never consulted by planning.
    pub fn hit_map(&self) -> &Array2<Option<u8>> {
        &self.hit_map
    }

    /// Running sum of hits, excluding the mandatory initial observation and
    /// terminal steps.
    pub fn cumulative_hits(&self) -> u64 {
        self.cumulative_hits
    }

    pub fn num_actions(&self) -> usize {
        2 * self.grid.ndim() + usize::from(self.config.allow_stay)
    }

    pub fn nhits(&self) -> usize {
        self.kernel.nhits()
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn last_hit(&self) -> Option<usize> {
        self.last_hit
    }

    /// Whether the agent sits within one cell of the domain boundary.
    pub fn agent_near_boundaries(&self) -> bool {
        self.near_boundaries
    }

    /// Back-and-forth loop detector. Permanently disabled: the positions it
    /// would compare are tracked, but the check always reports false.
    pub fn agent_stuck(&self) -> bool {
        false
    }

    /// Belief recentered on the agent, spatial shape 2n−1 per axis: the flat
    /// tensor contract consumed by neural-network policies.
    pub fn centered_belief(&self) -> Array2<f64> {
        let [w, h] = self.grid.shape();
        let mut centered = Array2::zeros((2 * w - 1, 2 * h - 1));
        for ((i, j), &value) in self.belief.view().indexed_iter() {
            centered[[w - 1 + i - self.agent[0], h - 1 + j - self.agent[1]]] = value;
        }
        centered
    }

    /// Replace the belief wholesale, keeping the entropy consistent.
    #[cfg(test)]
    pub(crate) fn set_belief(&mut self, belief: Belief) {
        self.entropy = belief.entropy();
        self.belief = belief;
    }
}
