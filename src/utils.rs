//! Shared numeric helpers for the source-tracking crate

use rand::{Rng, distr::StandardUniform};

/// Sample an index from a categorical distribution.
///
/// Implements the standard threshold-scan weighted draw:
/// 1. Compute the total probability mass
/// 2. Draw a random threshold in [0, total)
/// 3. Walk the entries, subtracting mass until the threshold crosses zero
///
/// If the total mass is zero or negative, falls back to a uniform draw over
/// the indices. The last index is returned as a fallback when the threshold
/// never crosses zero (numerical stability).
///
/// # Examples
///
/// ```
/// use rand::{SeedableRng, rngs::StdRng};
/// use sourcetrack::utils::sample_categorical;
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let index = sample_categorical(&mut rng, &[0.25, 0.5, 0.25]);
/// assert!(index.is_some_and(|i| i < 3));
/// ```
pub fn sample_categorical<R: Rng>(rng: &mut R, probabilities: &[f64]) -> Option<usize> {
    if probabilities.is_empty() {
        return None;
    }

    let total: f64 = probabilities.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Some(rng.random_range(0..probabilities.len()));
    }

    let mut threshold = rng.sample::<f64, _>(StandardUniform) * total;
    for (index, &p) in probabilities.iter().enumerate() {
        if threshold < p {
            return Some(index);
        }
        threshold -= p;
    }

    Some(probabilities.len() - 1)
}

/// First index whose value lies within `tolerance` of the minimum.
///
/// Non-finite entries are skipped unless every entry is non-finite, in which
/// case index 0 is returned.
pub fn argmin_within(values: &[f64], tolerance: f64) -> usize {
    let minimum = values.iter().copied().fold(f64::INFINITY, f64::min);
    if !minimum.is_finite() {
        return 0;
    }
    values
        .iter()
        .position(|&v| (v - minimum).abs() < tolerance)
        .unwrap_or(0)
}

/// First index whose value lies within `tolerance` of the maximum.
pub fn argmax_within(values: &[f64], tolerance: f64) -> usize {
    let maximum = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !maximum.is_finite() {
        return 0;
    }
    values
        .iter()
        .position(|&v| (v - maximum).abs() < tolerance)
        .unwrap_or(0)
}

/// Index of the strictly smallest value (first occurrence).
pub fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, &v) in values.iter().enumerate() {
        if v < values[best] {
            best = index;
        }
    }
    best
}
