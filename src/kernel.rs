//! Translation-invariant observation-likelihood kernel.
//!
//! The probability of observing each hit count depends only on the offset
//! between the agent and the source, so the whole model is precomputed once
//! as one table per hit value over every relative offset. The mean hit rate
//! at distance `d` and downwind coordinate `x` (agent minus source) follows
//! the dimensionless plume closure
//!
//! ```text
//! mu(d, x) = R / d * exp(V * x / 2 - d / lambda),
//! lambda   = sqrt((tau / V^2) / (1 + tau / 4))
//! ```
//!
//! Hit counts are Poisson with rate `mu`; the top bucket is right-censored
//! ("this count or more") so each offset's buckets sum to exactly 1.

use ndarray::{Array2, ArrayView2};
use statrs::function::gamma::ln_gamma;

use crate::{
    EPSILON,
    error::{Error, Result},
    grid::{Grid, Norm, Position},
};

/// Poisson pmf, tolerating a zero rate (point mass at zero counts).
fn poisson_pmf(mu: f64, h: usize) -> f64 {
    if mu <= 0.0 {
        return if h == 0 { 1.0 } else { 0.0 };
    }
    (-mu + h as f64 * mu.ln() - ln_gamma(h as f64 + 1.0)).exp()
}

/// Precomputed P(hit = h | relative offset), one table per hit value.
///
/// Immutable after construction and shared read-only by the environment and
/// every policy. Tables have spatial shape 2n+1 per axis with the zero
/// offset at index (W, H); by definition every bucket is 0 at the origin.
#[derive(Debug, Clone)]
pub struct HitKernel {
    grid: Grid,
    tables: Vec<Array2<f64>>,
    plume: Option<Plume>,
}

/// Emission parameters retained for direct (ground-truth) evaluation.
#[derive(Debug, Clone, Copy)]
struct Plume {
    emission_rate: f64,
    wind_speed: f64,
    lambda: f64,
}

impl HitKernel {
    /// Build the kernel from the dimensionless emission parameters.
    ///
    /// Fails with [`Error::InvalidConfiguration`] when `nhits` is too large:
    /// if a lower bucket already reaches cumulative probability 1 at every
    /// offset, the censored top bucket would be identically zero.
    pub fn build(
        grid: &Grid,
        nhits: usize,
        emission_rate: f64,
        wind_speed: f64,
        coherence_time: f64,
        norm: Norm,
    ) -> Result<Self> {
        if nhits < 2 {
            return Err(Error::config(format!(
                "at least 2 hit buckets are required, got {nhits}"
            )));
        }
        let lambda = ((coherence_time / (wind_speed * wind_speed))
            / (1.0 + coherence_time / 4.0))
            .sqrt();
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(Error::config(format!(
                "degenerate correlation length {lambda} (wind_speed={wind_speed}, coherence_time={coherence_time})"
            )));
        }

        let [sx, sy] = grid.offset_shape();
        let [ox, oy] = grid.offset_origin();
        let mu = Array2::from_shape_fn((sx, sy), |(i, j)| {
            if (i, j) == (ox, oy) {
                return 0.0;
            }
            let offset = [i as i64 - ox as i64, j as i64 - oy as i64];
            let x = -offset[0] as f64; // agent minus source along the wind axis
            mean_hit_rate(norm.length(offset), x, emission_rate, wind_speed, lambda)
        });

        let mut tables = Vec::with_capacity(nhits);
        let mut cumulative = Array2::<f64>::zeros((sx, sy));
        for h in 0..nhits - 1 {
            let table = mu.mapv(|m| poisson_pmf(m, h));
            cumulative += &table;
            tables.push(table);
            let saturated = cumulative.iter().all(|&s| (s - 1.0).abs() < EPSILON);
            if saturated {
                return Err(Error::config(format!(
                    "{nhits} hit buckets is too large: bucket {h} already reaches cumulative probability 1, reduce to {} or lower",
                    h + 1
                )));
            }
        }
        // Right-censored top bucket: P(hit >= nhits - 1).
        tables.push(cumulative.mapv(|s| (1.0 - s).max(0.0)));

        let kernel = Self {
            grid: *grid,
            tables,
            plume: Some(Plume {
                emission_rate,
                wind_speed,
                lambda,
            }),
        };
        kernel.check_bucket_sums([ox, oy])?;
        Ok(kernel.zero_origin([ox, oy]))
    }

    /// Wrap hand-built per-hit tables, validating shape and bucket sums.
    ///
    /// Tables must share one of the two supported spatial extents (2n+1 or
    /// 2n−1 per axis) and sum to 1 at every offset except the origin.
    pub fn from_table(grid: &Grid, tables: Vec<Array2<f64>>) -> Result<Self> {
        if tables.len() < 2 {
            return Err(Error::config(format!(
                "a kernel needs at least 2 hit buckets, got {}",
                tables.len()
            )));
        }
        let dims = grid.shape();
        let mut origin = [0usize; 2];
        for axis in 0..2 {
            let len = tables[0].shape()[axis];
            let n = dims[axis];
            if len == 2 * n + 1 {
                origin[axis] = n;
            } else if len == 2 * n - 1 {
                origin[axis] = n - 1;
            } else {
                return Err(Error::InvalidKernelShape { axis, len, dim: n });
            }
        }
        if tables.iter().any(|t| t.shape() != tables[0].shape()) {
            return Err(Error::config("hit buckets have mismatched shapes"));
        }
        let kernel = Self {
            grid: *grid,
            tables,
            plume: None,
        };
        kernel.check_bucket_sums(origin)?;
        Ok(kernel.zero_origin(origin))
    }

    fn check_bucket_sums(&self, origin: [usize; 2]) -> Result<()> {
        let shape = self.tables[0].shape().to_vec();
        for i in 0..shape[0] {
            for j in 0..shape[1] {
                if [i, j] == origin {
                    continue;
                }
                let sum: f64 = self.tables.iter().map(|t| t[[i, j]]).sum();
                if (sum - 1.0).abs() >= EPSILON {
                    return Err(Error::LikelihoodInconsistency { sum });
                }
            }
        }
        Ok(())
    }

    fn zero_origin(mut self, origin: [usize; 2]) -> Self {
        for table in &mut self.tables {
            table[origin] = 0.0;
        }
        self
    }

    /// Number of hit buckets (the last one is right-censored).
    pub fn nhits(&self) -> usize {
        self.tables.len()
    }

    /// Full offset table for one hit value.
    pub fn table(&self, hit: usize) -> &Array2<f64> {
        &self.tables[hit]
    }

    /// Grid-sized likelihood windows aligned at `origin`, one per hit value.
    pub fn window(&self, origin: Position) -> Result<Vec<ArrayView2<'_, f64>>> {
        self.tables
            .iter()
            .map(|table| self.grid.window(table, origin))
            .collect()
    }

    /// Hit distribution at a true agent/source separation.
    ///
    /// Used in ground-truth mode, where the observation is sampled from the
    /// actual distance `d` and downwind coordinate `x` (agent minus source)
    /// rather than folded against the belief. Only available for kernels
    /// built from emission parameters.
    pub fn hit_distribution(&self, distance: f64, x: f64) -> Result<Vec<f64>> {
        let plume = self.plume.ok_or_else(|| {
            Error::config("hit_distribution requires a kernel built from emission parameters")
        })?;
        let mu = mean_hit_rate(
            distance,
            x,
            plume.emission_rate,
            plume.wind_speed,
            plume.lambda,
        );
        let nhits = self.nhits();
        let mut probabilities = vec![0.0; nhits];
        let mut partial = 0.0;
        for (h, slot) in probabilities.iter_mut().take(nhits - 1).enumerate() {
            *slot = poisson_pmf(mu, h);
            partial += *slot;
        }
        probabilities[nhits - 1] = (1.0 - partial).max(0.0);
        Ok(probabilities)
    }

    /// Direct lookup of P(hit | offset); 0 outside the tabulated range.
    pub fn likelihood(&self, hit: usize, offset: [i64; 2]) -> f64 {
        let table = &self.tables[hit];
        let shape = table.shape();
        // Both supported extents are odd, so the origin is the center index.
        let oi = (shape[0] / 2) as i64 + offset[0];
        let oj = (shape[1] / 2) as i64 + offset[1];
        if oi < 0 || oj < 0 || oi as usize >= shape[0] || oj as usize >= shape[1] {
            return 0.0;
        }
        table[[oi as usize, oj as usize]]
    }
}

/// Mean number of hits at distance `d` with downwind coordinate `x`.
fn mean_hit_rate(d: f64, x: f64, emission_rate: f64, wind_speed: f64, lambda: f64) -> f64 {
    let d = if d == 0.0 { 1.0 } else { d };
    emission_rate / d * (0.5 * wind_speed * x - d / lambda).exp()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn small_grid() -> Grid {
        Grid::new(7, 5).unwrap()
    }

    #[test]
    fn buckets_sum_to_one_away_from_origin() {
        let grid = small_grid();
        let kernel = HitKernel::build(&grid, 3, 2.5, 2.0, 150.0, Norm::Euclidean).unwrap();
        let [ox, oy] = grid.offset_origin();
        for i in 0..2 * grid.width() + 1 {
            for j in 0..2 * grid.height() + 1 {
                let sum: f64 = (0..3).map(|h| kernel.table(h)[[i, j]]).sum();
                if (i, j) == (ox, oy) {
                    assert_eq!(sum, 0.0);
                } else {
                    assert_relative_eq!(sum, 1.0, epsilon = 1e-10);
                }
            }
        }
    }

    #[test]
    fn origin_buckets_are_zero() {
        let grid = small_grid();
        let kernel = HitKernel::build(&grid, 2, 2.5, 2.0, 150.0, Norm::Euclidean).unwrap();
        assert_eq!(kernel.likelihood(0, [0, 0]), 0.0);
        assert_eq!(kernel.likelihood(1, [0, 0]), 0.0);
    }

    #[test]
    fn hits_are_likelier_downwind() {
        let grid = small_grid();
        let kernel = HitKernel::build(&grid, 2, 2.5, 2.0, 150.0, Norm::Euclidean).unwrap();
        // Agent downwind of the source (x = agent - source > 0) detects more.
        let downwind = kernel.likelihood(1, [-3, 0]);
        let upwind = kernel.likelihood(1, [3, 0]);
        assert!(
            downwind > upwind,
            "downwind {downwind} should exceed upwind {upwind}"
        );
    }

    #[test]
    fn oversized_bucket_count_is_rejected() {
        let grid = small_grid();
        // A vanishing emission rate makes every count beyond 0 impossible,
        // so bucket 0 saturates the cumulative probability.
        let result = HitKernel::build(&grid, 3, 1e-300, 2.0, 150.0, Norm::Euclidean);
        assert!(matches!(
            result,
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn from_table_rejects_bad_shapes() {
        let grid = small_grid();
        let tables = vec![Array2::zeros((15, 10)), Array2::zeros((15, 10))];
        assert!(matches!(
            HitKernel::from_table(&grid, tables),
            Err(Error::InvalidKernelShape { axis: 1, .. })
        ));
    }

    #[test]
    fn from_table_rejects_unnormalized_buckets() {
        let grid = small_grid();
        let tables = vec![
            Array2::from_elem((15, 11), 0.3),
            Array2::from_elem((15, 11), 0.3),
        ];
        assert!(matches!(
            HitKernel::from_table(&grid, tables),
            Err(Error::LikelihoodInconsistency { .. })
        ));
    }

    #[test]
    fn window_round_trip_matches_direct_lookup() {
        let grid = small_grid();
        let kernel = HitKernel::build(&grid, 2, 2.5, 2.0, 150.0, Norm::Euclidean).unwrap();
        for ax in 0..grid.width() {
            for ay in 0..grid.height() {
                let windows = kernel.window([ax, ay]).unwrap();
                for cx in 0..grid.width() {
                    for cy in 0..grid.height() {
                        let offset = [cx as i64 - ax as i64, cy as i64 - ay as i64];
                        for h in 0..2 {
                            assert_eq!(windows[h][[cx, cy]], kernel.likelihood(h, offset));
                        }
                    }
                }
            }
        }
    }
}
