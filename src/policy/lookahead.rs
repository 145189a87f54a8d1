//! N-step infotaxis lookahead planner.
//!
//! Picks the first action of a length-`steps_ahead` sequence by expanding an
//! *exact* belief tree — every action and every hit outcome enumerated, no
//! sampling — and running backward induction over it. Two objectives exist:
//!
//! - undiscounted (`discount = 1`): minimize expected terminal entropy;
//! - discounted (`0 < discount < 1`): maximize expected discounted
//!   information gain.
//!
//! `discount = 0` degenerates exactly to the one-step infotaxis and shares
//! its code path. The branching factor is Nactions·Nhits per level, so both
//! time and memory grow geometrically with the horizon; horizons beyond ~3
//! are impractical.
//!
//! A planning call is synchronous and runs three phases in sequence:
//! collect (expand to the horizon), backward induction, decided. There is no
//! partial result and no cancellation.

use super::{DecisionPolicy, EPSILON_CHOICE};
use crate::{
    EPSILON,
    belief::Belief,
    env::{SourceTracking, apply_action},
    error::{Error, Result},
    grid::Position,
    utils::{argmax_within, argmin, argmin_within},
};

/// Entropy placeholder for branches no legal move reaches. The discounted
/// recursion negates entropies, so it needs a large finite value instead of
/// infinity to keep the reduction NaN-free.
const UNREACHABLE_DISCOUNTED: f64 = 1e16;
const UNREACHABLE_UNDISCOUNTED: f64 = f64::INFINITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Undiscounted,
    Discounted,
}

impl Variant {
    fn unreachable_entropy(self) -> f64 {
        match self {
            Variant::Undiscounted => UNREACHABLE_UNDISCOUNTED,
            Variant::Discounted => UNREACHABLE_DISCOUNTED,
        }
    }

    /// Entropy recorded for children of an already-terminal branch. The two
    /// conventions differ in the original formulation and are preserved
    /// distinctly: 0 for the discounted recursion, minus the parent's
    /// terminal depth for the undiscounted one.
    fn absorbed_entropy(self, parent_terminal_depth: u32) -> f64 {
        match self {
            Variant::Undiscounted => -(parent_terminal_depth as f64),
            Variant::Discounted => 0.0,
        }
    }
}

/// One node of the lookahead tree, addressed by its flat index within a
/// depth level: `child = parent · (Nactions · Nhits) + action · Nhits + hit`.
#[derive(Debug, Clone)]
struct Branch {
    belief: Option<Belief>,
    agent: Option<Position>,
    p_end: f64,
    /// Reach probability of the hit outcome leading here; 1/Nhits on
    /// absorbed branches (bookkeeping convention preserving dense shapes).
    p_hit: f64,
    entropy: f64,
    /// Levels since this path hit a terminal state; 0 while alive.
    terminal: u32,
}

/// Chosen action plus per-action diagnostic values at depth 0.
///
/// For the undiscounted variant the values are the expected entropy
/// reduction `H − E[H_terminal]`; for the discounted variant the cumulative
/// discounted gain `H + G`; for the one-step path the raw infotaxis
/// entropy-delta scores.
#[derive(Debug, Clone)]
pub struct Decision {
    pub action: usize,
    pub values: Vec<f64>,
}

/// Exact n-step lookahead extension of the infotaxis policy.
#[derive(Debug, Clone)]
pub struct InfotaxisLookahead {
    steps_ahead: usize,
    discount: f64,
}

impl InfotaxisLookahead {
    /// `steps_ahead` ≥ 1; `discount` in [0, 1]. The boundary values select
    /// dedicated code paths: 0 is the plain one-step infotaxis, 1 the
    /// undiscounted recursion (never the discounted formula with 1
    /// substituted — the two are numerically distinct).
    pub fn new(steps_ahead: usize, discount: f64) -> Result<Self> {
        if steps_ahead == 0 {
            return Err(Error::config("steps_ahead must be at least 1"));
        }
        if !(0.0..=1.0).contains(&discount) {
            return Err(Error::config(format!(
                "discount must lie in [0, 1], got {discount}"
            )));
        }
        Ok(Self {
            steps_ahead,
            discount,
        })
    }

    pub fn steps_ahead(&self) -> usize {
        self.steps_ahead
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    /// Run the full plan: expand to the horizon, induct backward, decide.
    pub fn decide(&self, env: &SourceTracking) -> Result<Decision> {
        if self.steps_ahead == 1 || self.discount == 0.0 {
            return one_step_decision(env);
        }
        if self.discount == 1.0 {
            let levels = expand(env, self.steps_ahead, Variant::Undiscounted)?;
            Ok(induct_undiscounted(env, &levels))
        } else {
            let levels = expand(env, self.steps_ahead, Variant::Discounted)?;
            Ok(induct_discounted(env, &levels, self.discount))
        }
    }
}

impl DecisionPolicy for InfotaxisLookahead {
    fn name(&self) -> &str {
        "infotaxis lookahead"
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        self.decide(env).map(|decision| decision.action)
    }

    fn action_scores(&mut self, env: &SourceTracking) -> Result<Option<Vec<f64>>> {
        self.decide(env).map(|decision| Some(decision.values))
    }
}

/// The `steps_ahead = 1` / `discount = 0` degeneration: identical action and
/// score as the plain one-step infotaxis.
fn one_step_decision(env: &SourceTracking) -> Result<Decision> {
    let values = super::heuristics::infotaxis_scores(
        env.grid(),
        env.kernel(),
        env.belief(),
        env.agent(),
        env.entropy(),
        env.config().allow_stay,
    )?;
    Ok(Decision {
        action: argmin(&values),
        values,
    })
}

/// Collecting phase: expand the exact belief tree to the horizon.
///
/// Level d holds (Nactions·Nhits)^d branches. Expansion replays the exact
/// `step` math (without randomness) for alive branches; absorbed branches
/// propagate dense placeholders so every path stays addressable.
fn expand(env: &SourceTracking, steps: usize, variant: Variant) -> Result<Vec<Vec<Branch>>> {
    let grid = env.grid();
    let allow_stay = env.config().allow_stay;
    let na = env.num_actions();
    let nh = env.nhits();

    let root = Branch {
        belief: Some(env.belief().clone()),
        agent: Some(env.agent()),
        p_end: f64::INFINITY, // unused at depth 0
        p_hit: f64::INFINITY,
        entropy: env.entropy(),
        terminal: 0,
    };
    let mut levels = vec![vec![root]];

    for depth in 0..steps {
        let parents = &levels[depth];
        let mut children = vec![
            Branch {
                belief: None,
                agent: None,
                p_end: 0.0,
                p_hit: 1.0,
                entropy: variant.unreachable_entropy(),
                terminal: 0,
            };
            parents.len() * na * nh
        ];

        for (ip, parent) in parents.iter().enumerate() {
            if depth > 0 && parent.terminal > 0 {
                // Absorbed path: children stop contributing new information
                // but remain addressable with dense bookkeeping.
                for a in 0..na {
                    for h in 0..nh {
                        let child = &mut children[(ip * na + a) * nh + h];
                        child.agent = parent.agent;
                        child.p_end = 0.0;
                        child.p_hit = 1.0 / nh as f64;
                        child.terminal = parent.terminal + 1;
                        child.entropy = variant.absorbed_entropy(parent.terminal);
                    }
                }
                continue;
            }
            let Some(agent) = parent.agent else {
                continue; // unreachable branch: children keep placeholders
            };
            let belief = parent
                .belief
                .as_ref()
                .expect("alive branches carry a belief");

            for a in 0..na {
                let (destination, allowed) = apply_action(grid, allow_stay, a, agent)?;
                if !allowed {
                    continue;
                }
                let p_end = belief.value_at(destination);
                let newly_terminal = p_end > 1.0 - EPSILON;

                let mut conditioned = belief.clone();
                conditioned.zero_at(destination);
                conditioned.renormalize();
                let windows = env.kernel().window(destination)?;

                for (h, window) in windows.iter().enumerate() {
                    let (posterior, p_hit) = conditioned.posterior(window);
                    let child = &mut children[(ip * na + a) * nh + h];
                    child.entropy = posterior.entropy();
                    child.belief = Some(posterior);
                    child.agent = Some(destination);
                    child.p_end = p_end;
                    child.p_hit = p_hit;
                    child.terminal = u32::from(newly_terminal);
                }
            }
        }
        levels.push(children);
    }
    Ok(levels)
}

/// Undiscounted backward induction: minimize expected terminal entropy.
fn induct_undiscounted(env: &SourceTracking, levels: &[Vec<Branch>]) -> Decision {
    let na = env.num_actions();
    let nh = env.nhits();
    let steps = levels.len() - 1;

    let mut values: Vec<f64> = levels[steps].iter().map(|b| b.entropy).collect();
    for depth in (0..steps).rev() {
        let children = &levels[depth + 1];
        let n_parent = levels[depth].len();
        let mut per_action = vec![0.0; n_parent * na];
        for (ic, child) in children.iter().enumerate() {
            per_action[ic / nh] += (1.0 - child.p_end) * child.p_hit * values[ic];
        }
        if depth == 0 {
            let action = argmin_within(&per_action, EPSILON_CHOICE);
            let values = per_action.iter().map(|&v| env.entropy() - v).collect();
            return Decision { action, values };
        }
        values = (0..n_parent)
            .map(|ip| {
                per_action[ip * na..(ip + 1) * na]
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
    }
    unreachable!("levels always contain at least one expansion")
}

/// Discounted backward induction: maximize cumulative discounted gain.
fn induct_discounted(env: &SourceTracking, levels: &[Vec<Branch>], discount: f64) -> Decision {
    let na = env.num_actions();
    let nh = env.nhits();
    let steps = levels.len() - 1;

    let mut backup = vec![0.0; levels[steps].len()];
    for depth in (0..steps).rev() {
        let children = &levels[depth + 1];
        let n_parent = levels[depth].len();
        let weight = discount.powi(depth as i32 + 1);
        let mut per_action = vec![0.0; n_parent * na];
        for (ic, child) in children.iter().enumerate() {
            per_action[ic / nh] +=
                (1.0 - child.p_end) * child.p_hit * (-child.entropy + weight * backup[ic]);
        }
        if depth == 0 {
            let action = argmax_within(&per_action, EPSILON_CHOICE);
            let values = per_action.iter().map(|&v| env.entropy() + v).collect();
            return Decision { action, values };
        }
        backup = (0..n_parent)
            .map(|ip| {
                let best = per_action[ip * na..(ip + 1) * na]
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                levels[depth][ip].entropy + best
            })
            .collect();
    }
    unreachable!("levels always contain at least one expansion")
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::Array2;

    use super::*;
    use crate::{
        config::EnvConfig,
        grid::{Grid, Norm},
        kernel::HitKernel,
        policy::heuristics::infotaxis_scores,
    };

    fn small_env(seed: u64) -> SourceTracking {
        SourceTracking::new(
            EnvConfig::default().with_shape(9, 7).with_seed(seed),
        )
        .unwrap()
    }

    fn hand_kernel(grid: &Grid) -> HitKernel {
        let table = grid.offset_table(Norm::Manhattan);
        let hit1 = table.mapv(|d| 0.7 / (1.0 + d));
        let hit0 = hit1.mapv(|p| 1.0 - p);
        HitKernel::from_table(grid, vec![hit0, hit1]).unwrap()
    }

    /// Environment whose belief is fully concentrated one cell right of the
    /// agent, so stepping onto it terminates with certainty.
    fn near_certain_env() -> SourceTracking {
        let grid = Grid::new(3, 3).unwrap();
        let config = EnvConfig::default()
            .with_shape(3, 3)
            .with_start([1, 1])
            .with_seed(0);
        let mut env = SourceTracking::with_kernel(config, hand_kernel(&grid)).unwrap();
        let mut p = Array2::zeros((3, 3));
        p[[2, 1]] = 1.0;
        env.set_belief(Belief::from_array(p));
        env
    }

    #[test]
    fn one_step_regression_against_infotaxis() {
        let env = small_env(17);
        for planner in [
            InfotaxisLookahead::new(1, 0.5).unwrap(),
            InfotaxisLookahead::new(3, 0.0).unwrap(),
        ] {
            let decision = planner.decide(&env).unwrap();
            let scores = infotaxis_scores(
                env.grid(),
                env.kernel(),
                env.belief(),
                env.agent(),
                env.entropy(),
                env.config().allow_stay,
            )
            .unwrap();
            assert_eq!(decision.action, argmin(&scores));
            for (a, b) in decision.values.iter().zip(scores.iter()) {
                if b.is_finite() {
                    assert_relative_eq!(a, b, epsilon = 1e-12);
                } else {
                    assert!(a.is_infinite());
                }
            }
        }
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(InfotaxisLookahead::new(0, 0.5).is_err());
        assert!(InfotaxisLookahead::new(2, 1.5).is_err());
        assert!(InfotaxisLookahead::new(2, -0.1).is_err());
    }

    #[test]
    fn two_step_undiscounted_agrees_with_manual_induction() {
        let env = small_env(23);
        let planner = InfotaxisLookahead::new(2, 1.0).unwrap();
        let decision = planner.decide(&env).unwrap();

        // Manual reduction straight from the expanded tree.
        let levels = expand(&env, 2, Variant::Undiscounted).unwrap();
        let na = env.num_actions();
        let nh = env.nhits();
        let leaf = &levels[2];
        let mid = &levels[1];

        let mut mid_values = vec![0.0; mid.len() * na];
        for (ic, child) in leaf.iter().enumerate() {
            mid_values[ic / nh] += (1.0 - child.p_end) * child.p_hit * child.entropy;
        }
        let reduced: Vec<f64> = (0..mid.len())
            .map(|ip| {
                mid_values[ip * na..(ip + 1) * na]
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let mut root_values = vec![0.0; na];
        for (ic, child) in mid.iter().enumerate() {
            root_values[ic / nh] += (1.0 - child.p_end) * child.p_hit * reduced[ic];
        }
        let expected_action = argmin_within(&root_values, EPSILON_CHOICE);
        assert_eq!(decision.action, expected_action);
        for (value, raw) in decision.values.iter().zip(root_values.iter()) {
            assert_relative_eq!(value, &(env.entropy() - raw), epsilon = 1e-12);
        }
    }

    #[test]
    fn terminal_branches_propagate_depth_counters() {
        let env = near_certain_env();
        let steps = 3;
        for variant in [Variant::Undiscounted, Variant::Discounted] {
            let levels = expand(&env, steps, variant).unwrap();
            let na = env.num_actions();
            let nh = env.nhits();

            // Locate the action stepping onto the certain cell.
            let toward = (0..na)
                .find(|&a| {
                    let (dest, ok) = apply_action(env.grid(), false, a, env.agent()).unwrap();
                    ok && dest == [2, 1]
                })
                .expect("some action reaches the certain cell");

            // Depth 1: the branch is newly terminal.
            for h in 0..nh {
                assert_eq!(levels[1][toward * nh + h].terminal, 1);
            }
            // Every descendant's counter grows by exactly 1 per level.
            let mut indices: Vec<usize> = (0..nh).map(|h| toward * nh + h).collect();
            for depth in 2..=steps {
                let mut next = Vec::new();
                for &ip in &indices {
                    for a in 0..na {
                        for h in 0..nh {
                            let ic = (ip * na + a) * nh + h;
                            let child = &levels[depth][ic];
                            assert_eq!(child.terminal, depth as u32);
                            assert_relative_eq!(
                                child.p_hit,
                                1.0 / nh as f64,
                                epsilon = 1e-15
                            );
                            assert_eq!(child.p_end, 0.0);
                            let expected_entropy = match variant {
                                Variant::Discounted => 0.0,
                                Variant::Undiscounted => -((depth as f64) - 1.0),
                            };
                            assert_relative_eq!(
                                child.entropy,
                                expected_entropy,
                                epsilon = 1e-15
                            );
                            next.push(ic);
                        }
                    }
                }
                indices = next;
            }
        }
    }

    #[test]
    fn lookahead_is_deterministic() {
        let env = small_env(31);
        let planner = InfotaxisLookahead::new(2, 0.9).unwrap();
        let first = planner.decide(&env).unwrap();
        let second = planner.decide(&env).unwrap();
        assert_eq!(first.action, second.action);
        assert_eq!(first.values, second.values);
    }

    #[test]
    fn discounted_and_undiscounted_recursions_are_distinct() {
        let env = small_env(37);
        let undiscounted = InfotaxisLookahead::new(2, 1.0).unwrap().decide(&env).unwrap();
        let discounted = InfotaxisLookahead::new(2, 0.999).unwrap().decide(&env).unwrap();
        // Same tree, different objectives: the value scales must differ even
        // when the chosen action coincides.
        assert_ne!(undiscounted.values, discounted.values);
    }

    #[test]
    fn deeper_lookahead_never_chooses_a_blocked_move() {
        let grid = Grid::new(5, 3).unwrap();
        let config = EnvConfig::default()
            .with_shape(5, 3)
            .with_start([0, 0])
            .with_seed(2);
        let env = SourceTracking::with_kernel(config, hand_kernel(&grid)).unwrap();
        for planner in [
            InfotaxisLookahead::new(2, 1.0).unwrap(),
            InfotaxisLookahead::new(2, 0.9).unwrap(),
        ] {
            let decision = planner.decide(&env).unwrap();
            let (_, allowed) = apply_action(&grid, false, decision.action, [0, 0]).unwrap();
            assert!(allowed, "{}: blocked action chosen", planner.discount());
        }
    }
}
