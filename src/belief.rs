//! Dense Bayesian posterior over candidate source locations.
//!
//! The belief is owned exclusively by the environment and mutated only by
//! its update operations; policies work on read-only views or copies. The
//! invariant is sum ≈ 1 (tolerance 1e-10) at all times, except for the
//! degenerate terminal state where a single cell carries all the mass.

use ndarray::{Array2, ArrayView2};

use crate::{
    EPSILON,
    grid::{Grid, Position},
};

/// Round-off floor: products of a probability with a likelihood can land an
/// ulp below zero; anything past this is a genuine sign error.
const NEGATIVE_ROUNDOFF: f64 = -1e-15;

#[derive(Debug, Clone, PartialEq)]
pub struct Belief {
    p: Array2<f64>,
}

impl Belief {
    /// Uniform belief over every cell except `excluded` (the agent's start).
    pub fn uniform_excluding(grid: &Grid, excluded: Position) -> Self {
        let cells = grid.num_cells();
        let mut p = Array2::from_elem((grid.width(), grid.height()), 1.0 / (cells as f64 - 1.0));
        p[excluded] = 0.0;
        Self { p }
    }

    /// Wrap an explicit probability array (used by previews and tests).
    pub fn from_array(p: Array2<f64>) -> Self {
        Self { p }
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.p.view()
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.p
    }

    pub fn sum(&self) -> f64 {
        self.p.sum()
    }

    pub fn value_at(&self, cell: Position) -> f64 {
        self.p[cell]
    }

    pub fn zero_at(&mut self, cell: Position) {
        self.p[cell] = 0.0;
    }

    /// Normalize in place and return the pre-normalization residual mass.
    ///
    /// A residual at or below epsilon leaves the array untouched: the caller
    /// interprets that as certain localization, not as an error.
    pub fn renormalize(&mut self) -> f64 {
        let residual = self.p.sum();
        if residual > EPSILON {
            self.p /= residual;
        }
        residual
    }

    /// Bayes fold: multiply pointwise by a likelihood window, clamp negative
    /// round-off to exactly 0, renormalize. Returns the residual mass.
    pub fn fold_likelihood(&mut self, likelihood: &ArrayView2<'_, f64>) -> f64 {
        self.p *= likelihood;
        self.p.mapv_inplace(|v| {
            if v < 0.0 && v > NEGATIVE_ROUNDOFF {
                0.0
            } else {
                v
            }
        });
        self.renormalize()
    }

    /// Posterior for one hit outcome: pointwise product with the likelihood
    /// window plus conditional normalization. Returns the posterior and the
    /// outcome mass P(hit); when the mass is at or below epsilon the product
    /// is returned unnormalized.
    pub fn posterior(&self, likelihood: &ArrayView2<'_, f64>) -> (Belief, f64) {
        let mut post = self.clone();
        post.p *= likelihood;
        let mass = post.p.sum();
        if mass > EPSILON {
            post.p /= mass;
        }
        (post, mass)
    }

    /// Collapse to the degenerate one-hot belief at `cell`.
    pub fn collapse_to(&mut self, cell: Position) {
        self.p.fill(0.0);
        self.p[cell] = 1.0;
    }

    /// Shannon entropy in bits; cells at or below epsilon contribute 0.
    pub fn entropy(&self) -> f64 {
        self.p
            .iter()
            .filter(|&&v| v > EPSILON)
            .map(|&v| -v * v.log2())
            .sum()
    }

    /// Whether all mass sits on a single cell (within epsilon).
    pub fn is_one_hot(&self) -> bool {
        self.p.iter().any(|&v| v >= 1.0 - EPSILON)
    }

    /// Cell with the largest probability (first occurrence on ties).
    pub fn argmax(&self) -> Position {
        let mut best = [0, 0];
        let mut best_value = f64::NEG_INFINITY;
        for ((i, j), &v) in self.p.indexed_iter() {
            if v > best_value {
                best_value = v;
                best = [i, j];
            }
        }
        best
    }

    /// Expectation of an arbitrary per-cell table under the belief.
    pub fn expect(&self, table: &ArrayView2<'_, f64>) -> f64 {
        self.p
            .iter()
            .zip(table.iter())
            .map(|(&p, &t)| p * t)
            .sum()
    }
}
