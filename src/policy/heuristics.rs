//! One-step heuristic policies.
//!
//! Shared pattern: preview each candidate move on a copy of the belief
//! (never mutating the environment), reduce the induced posterior to a
//! scalar score, select by argmin. Blocked moves score +∞ and are never
//! selected. The scoring cores are free functions over the environment's
//! immutable parts so they can be exercised with hand-built kernels.

use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{DecisionPolicy, EPSILON_CHOICE};
use crate::{
    EPSILON,
    belief::Belief,
    env::{SourceTracking, preview_transition},
    error::Result,
    grid::{Grid, Norm, Position},
    kernel::HitKernel,
    utils::argmin,
};

fn num_actions(grid: &Grid, allow_stay: bool) -> usize {
    2 * grid.ndim() + usize::from(allow_stay)
}

/// Expected entropy change per action: E[H(posterior)] − H(current).
///
/// Blocked moves score +∞. A destination already holding ≥ 1−ε of the mass
/// scores −ε − entropy, a sentinel that forces the terminating move.
pub fn infotaxis_scores(
    grid: &Grid,
    kernel: &HitKernel,
    belief: &Belief,
    position: Position,
    entropy: f64,
    allow_stay: bool,
) -> Result<Vec<f64>> {
    let mut scores = vec![f64::INFINITY; num_actions(grid, allow_stay)];
    for (action, score) in scores.iter_mut().enumerate() {
        let preview = preview_transition(grid, kernel, belief, position, action, allow_stay)?;
        if !preview.allowed {
            continue;
        }
        let expected = if preview.forces_terminal {
            -EPSILON
        } else {
            (1.0 - preview.p_end)
                * preview
                    .outcomes
                    .iter()
                    .map(|o| o.p_hit * o.entropy)
                    .sum::<f64>()
        };
        *score = expected - entropy;
    }
    Ok(scores)
}

/// Space-aware infotaxis scores: expectation of log2(D + 2^(H−1) − 1/2).
pub fn space_aware_scores(
    grid: &Grid,
    kernel: &HitKernel,
    belief: &Belief,
    position: Position,
    distance_table: &Array2<f64>,
    allow_stay: bool,
) -> Result<Vec<f64>> {
    let mut scores = vec![f64::INFINITY; num_actions(grid, allow_stay)];
    for (action, score) in scores.iter_mut().enumerate() {
        let preview = preview_transition(grid, kernel, belief, position, action, allow_stay)?;
        if !preview.allowed {
            continue;
        }
        if preview.forces_terminal {
            *score = -EPSILON;
            continue;
        }
        let dist = grid.window(distance_table, preview.destination)?;
        let mut expected = 0.0;
        for outcome in &preview.outcomes {
            let d = outcome.belief.expect(&dist);
            let mut value = d + (outcome.entropy - 1.0).exp2() - 0.5;
            if value > 0.0 {
                value = value.log2();
            }
            expected += (1.0 - preview.p_end) * outcome.p_hit * value;
        }
        *score = expected;
    }
    Ok(scores)
}

/// Greedy scores: 1 − P(source at destination).
pub fn greedy_scores(
    grid: &Grid,
    belief: &Belief,
    position: Position,
    allow_stay: bool,
) -> Result<Vec<f64>> {
    let mut scores = vec![f64::INFINITY; num_actions(grid, allow_stay)];
    for (action, score) in scores.iter_mut().enumerate() {
        let (destination, allowed) =
            crate::env::apply_action(grid, allow_stay, action, position)?;
        if allowed {
            *score = 1.0 - belief.value_at(destination);
        }
    }
    Ok(scores)
}

/// Expected posterior Manhattan distance to the source, per action.
pub fn mean_distance_scores(
    grid: &Grid,
    kernel: &HitKernel,
    belief: &Belief,
    position: Position,
    distance_table: &Array2<f64>,
    allow_stay: bool,
) -> Result<Vec<f64>> {
    let mut scores = vec![f64::INFINITY; num_actions(grid, allow_stay)];
    for (action, score) in scores.iter_mut().enumerate() {
        let preview = preview_transition(grid, kernel, belief, position, action, allow_stay)?;
        if !preview.allowed {
            continue;
        }
        if preview.forces_terminal {
            *score = -EPSILON;
            continue;
        }
        let dist = grid.window(distance_table, preview.destination)?;
        let expected: f64 = preview
            .outcomes
            .iter()
            .map(|o| o.p_hit * o.belief.expect(&dist))
            .sum();
        *score = (1.0 - preview.p_end) * expected;
    }
    Ok(scores)
}

/// Original infotaxis (Vergassola, Villermaux and Shraiman, Nature 2007).
///
/// Minimizes the expected posterior entropy after the next move. Unlike the
/// lookahead variants this takes the unique numerical minimizer rather than
/// breaking ε-ties by index.
#[derive(Debug, Default)]
pub struct Infotaxis;

impl Infotaxis {
    pub fn new() -> Self {
        Self
    }
}

impl DecisionPolicy for Infotaxis {
    fn name(&self) -> &str {
        "infotaxis"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        let scores = infotaxis_scores(
            env.grid(),
            env.kernel(),
            env.belief(),
            env.agent(),
            env.entropy(),
            env.config().allow_stay,
        )?;
        Ok(argmin(&scores))
    }

    fn action_scores(&mut self, env: &SourceTracking) -> Result<Option<Vec<f64>>> {
        infotaxis_scores(
            env.grid(),
            env.kernel(),
            env.belief(),
            env.agent(),
            env.entropy(),
            env.config().allow_stay,
        )
        .map(Some)
    }
}

/// Policy minimizing an empirical proxy of the value function blending the
/// entropy and the expected Manhattan distance to the source.
#[derive(Debug, Default)]
pub struct SpaceAwareInfotaxis {
    distance: Option<Array2<f64>>,
}

impl SpaceAwareInfotaxis {
    pub fn new() -> Self {
        Self::default()
    }

    fn distance_table(&mut self, grid: &Grid) -> &Array2<f64> {
        self.distance
            .get_or_insert_with(|| grid.offset_table(Norm::Manhattan))
    }
}

impl DecisionPolicy for SpaceAwareInfotaxis {
    fn name(&self) -> &str {
        "space-aware infotaxis"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        let grid = *env.grid();
        let table = self.distance_table(&grid);
        let scores = space_aware_scores(
            &grid,
            env.kernel(),
            env.belief(),
            env.agent(),
            table,
            env.config().allow_stay,
        )?;
        Ok(argmin(&scores))
    }

    fn action_scores(&mut self, env: &SourceTracking) -> Result<Option<Vec<f64>>> {
        let grid = *env.grid();
        let table = self.distance_table(&grid);
        space_aware_scores(
            &grid,
            env.kernel(),
            env.belief(),
            env.agent(),
            table,
            env.config().allow_stay,
        )
        .map(Some)
    }
}

/// Usual greedy policy: maximize the immediate find probability.
#[derive(Debug, Default)]
pub struct Greedy;

impl Greedy {
    pub fn new() -> Self {
        Self
    }
}

impl DecisionPolicy for Greedy {
    fn name(&self) -> &str {
        "greedy"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        let scores = greedy_scores(
            env.grid(),
            env.belief(),
            env.agent(),
            env.config().allow_stay,
        )?;
        Ok(argmin(&scores))
    }

    fn action_scores(&mut self, env: &SourceTracking) -> Result<Option<Vec<f64>>> {
        greedy_scores(
            env.grid(),
            env.belief(),
            env.agent(),
            env.config().allow_stay,
        )
        .map(Some)
    }
}

/// Policy minimizing the expected distance to the source at the next step.
#[derive(Debug, Default)]
pub struct MeanDistance {
    distance: Option<Array2<f64>>,
}

impl MeanDistance {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionPolicy for MeanDistance {
    fn name(&self) -> &str {
        "mean distance"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        let grid = *env.grid();
        let table = self
            .distance
            .get_or_insert_with(|| grid.offset_table(Norm::Manhattan));
        let scores = mean_distance_scores(
            &grid,
            env.kernel(),
            env.belief(),
            env.agent(),
            table,
            env.config().allow_stay,
        )?;
        Ok(argmin(&scores))
    }

    fn action_scores(&mut self, env: &SourceTracking) -> Result<Option<Vec<f64>>> {
        let grid = *env.grid();
        let table = self
            .distance
            .get_or_insert_with(|| grid.offset_table(Norm::Manhattan));
        mean_distance_scores(
            &grid,
            env.kernel(),
            env.belief(),
            env.agent(),
            table,
            env.config().allow_stay,
        )
        .map(Some)
    }
}

/// Reactive policy steering toward the cell maximizing belief over distance.
///
/// Pure function of the current belief, no Bayesian simulation. Ties among
/// minimal-distance actions are broken by the highest immediate find
/// probability.
#[derive(Debug, Default)]
pub struct POverD {
    distance: Option<Array2<f64>>,
}

impl POverD {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Choice core of the p-over-d policy: steer toward the cell maximizing
/// belief over distance, ties among minimal-distance actions broken by the
/// highest immediate find probability.
pub fn p_over_d_choice(
    grid: &Grid,
    belief: &Belief,
    position: Position,
    distance_table: &Array2<f64>,
    allow_stay: bool,
) -> Result<usize> {
    // Most likely source location with belief replaced by belief/d.
    let dist = grid.window(distance_table, position)?;
    let mut target = position;
    let mut best_ratio = f64::NEG_INFINITY;
    for ((i, j), &p) in belief.view().indexed_iter() {
        let d = dist[[i, j]];
        let ratio = if d == 0.0 { 0.0 } else { p / d };
        if ratio > best_ratio {
            best_ratio = ratio;
            target = [i, j];
        }
    }

    let actions = num_actions(grid, allow_stay);
    let mut scores = vec![f64::INFINITY; actions];
    let mut p_found = vec![0.0; actions];
    for action in 0..actions {
        let (destination, allowed) = crate::env::apply_action(grid, allow_stay, action, position)?;
        if allowed {
            scores[action] = grid.manhattan(destination, target);
            p_found[action] = belief.value_at(destination);
        }
    }

    let minimum = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let tied: Vec<usize> = (0..actions)
        .filter(|&a| (scores[a] - minimum).abs() < EPSILON_CHOICE)
        .collect();
    if tied.len() > 1 {
        let mut best = tied[0];
        let mut best_p = -EPSILON;
        for &a in &tied {
            if p_found[a] > best_p {
                best_p = p_found[a];
                best = a;
            }
        }
        Ok(best)
    } else {
        Ok(tied[0])
    }
}

impl DecisionPolicy for POverD {
    fn name(&self) -> &str {
        "p-over-d"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        let grid = *env.grid();
        let table = self
            .distance
            .get_or_insert_with(|| grid.offset_table(Norm::Manhattan));
        p_over_d_choice(
            &grid,
            env.belief(),
            env.agent(),
            table,
            env.config().allow_stay,
        )
    }
}

/// Uniform choice over all actions irrespective of validity; blocked choices
/// become environment no-ops.
#[derive(Debug)]
pub struct RandomWalk {
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl DecisionPolicy for RandomWalk {
    fn name(&self) -> &str {
        "random walk"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        Ok(self.rng.random_range(0..env.num_actions()))
    }
}

/// Voting policy (Cassandra, Kaelbling & Kurien, IEEE 1996).
///
/// Each cell votes its belief mass, split evenly across the valid actions
/// that strictly decrease the Manhattan distance to it; the action with the
/// most votes wins (first on ties).
#[derive(Debug, Default)]
pub struct Voting;

impl Voting {
    pub fn new() -> Self {
        Self
    }
}

/// Per-action vote totals for the voting policy.
pub fn voting_votes(
    grid: &Grid,
    belief: &Belief,
    position: Position,
    allow_stay: bool,
) -> Result<Vec<f64>> {
    let actions = num_actions(grid, allow_stay);
    let mut destinations = Vec::with_capacity(actions);
    for action in 0..actions {
        let (destination, allowed) = crate::env::apply_action(grid, allow_stay, action, position)?;
        destinations.push(allowed.then_some(destination));
    }

    let mut votes = vec![0.0; actions];
    for ((i, j), &p) in belief.view().indexed_iter() {
        if p <= 0.0 {
            continue;
        }
        let cell = [i, j];
        let current = grid.manhattan(position, cell);
        let closing: Vec<usize> = destinations
            .iter()
            .enumerate()
            .filter_map(|(a, dest)| {
                dest.filter(|&d| grid.manhattan(d, cell) < current)
                    .map(|_| a)
            })
            .collect();
        if closing.is_empty() {
            continue;
        }
        let share = p / closing.len() as f64;
        for a in closing {
            votes[a] += share;
        }
    }
    Ok(votes)
}

impl DecisionPolicy for Voting {
    fn name(&self) -> &str {
        "voting"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        let votes = voting_votes(
            env.grid(),
            env.belief(),
            env.agent(),
            env.config().allow_stay,
        )?;
        let mut best = 0;
        for (action, &v) in votes.iter().enumerate() {
            if v > votes[best] {
                best = action;
            }
        }
        Ok(best)
    }
}

/// Most-likely-state policy (Cassandra, Kaelbling & Kurien, IEEE 1996):
/// head straight for the argmax-belief cell.
#[derive(Debug, Default)]
pub struct MostLikelyState;

impl MostLikelyState {
    pub fn new() -> Self {
        Self
    }
}

impl DecisionPolicy for MostLikelyState {
    fn name(&self) -> &str {
        "most likely state"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        let grid = *env.grid();
        let allow_stay = env.config().allow_stay;
        let position = env.agent();
        let target = env.belief().argmax();

        let actions = num_actions(&grid, allow_stay);
        let mut scores = vec![f64::INFINITY; actions];
        for (action, score) in scores.iter_mut().enumerate() {
            let (destination, allowed) =
                crate::env::apply_action(&grid, allow_stay, action, position)?;
            if allowed {
                *score = grid.manhattan(destination, target);
            }
        }
        Ok(argmin(&scores))
    }
}
