//! Environment configuration.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    grid::{Norm, Position},
};

/// Configuration for a source-tracking environment.
///
/// Defaults reproduce the canonical setup: an 81×41 grid, 2 hit buckets,
/// dimensionless emission rate 2.5, mean wind 2 and turbulence coherence
/// time 150, Bayesian mode (no drawn source).
///
/// # Examples
///
/// ```
/// use sourcetrack::config::EnvConfig;
///
/// let config = EnvConfig::default()
///     .with_shape(21, 11)
///     .with_seed(42)
///     .with_draw_source(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Grid size per axis.
    pub shape: [usize; 2],
    /// Number of hit buckets; the last is right-censored.
    pub nhits: usize,
    /// Dimensionless source emission rate.
    pub emission_rate: f64,
    /// Dimensionless mean wind speed along the first axis.
    pub wind_speed: f64,
    /// Dimensionless turbulence coherence time.
    pub coherence_time: f64,
    /// Norm used for hit detections and the kernel distance field.
    pub norm: Norm,
    /// Ground-truth mode: draw an actual source location instead of relying
    /// purely on the Bayesian framework.
    pub draw_source: bool,
    /// Whether the extra "stay" action (index 2·dim) is available.
    pub allow_stay: bool,
    /// Hit value folded into the belief on restart.
    pub initial_hit: usize,
    /// Fixed start cell; None derives one from the grid shape.
    pub start: Option<Position>,
    /// Random seed for reproducibility; None draws from entropy.
    pub seed: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            shape: [81, 41],
            nhits: 2,
            emission_rate: 2.5,
            wind_speed: 2.0,
            coherence_time: 150.0,
            norm: Norm::Euclidean,
            draw_source: false,
            allow_stay: false,
            initial_hit: 1,
            start: None,
            seed: None,
        }
    }
}

impl EnvConfig {
    pub fn with_shape(mut self, width: usize, height: usize) -> Self {
        self.shape = [width, height];
        self
    }

    pub fn with_nhits(mut self, nhits: usize) -> Self {
        self.nhits = nhits;
        self
    }

    pub fn with_emission(mut self, emission_rate: f64) -> Self {
        self.emission_rate = emission_rate;
        self
    }

    pub fn with_wind(mut self, wind_speed: f64, coherence_time: f64) -> Self {
        self.wind_speed = wind_speed;
        self.coherence_time = coherence_time;
        self
    }

    pub fn with_norm(mut self, norm: Norm) -> Self {
        self.norm = norm;
        self
    }

    pub fn with_draw_source(mut self, draw_source: bool) -> Self {
        self.draw_source = draw_source;
        self
    }

    pub fn with_allow_stay(mut self, allow_stay: bool) -> Self {
        self.allow_stay = allow_stay;
        self
    }

    pub fn with_initial_hit(mut self, initial_hit: usize) -> Self {
        self.initial_hit = initial_hit;
        self
    }

    pub fn with_start(mut self, start: Position) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Start cell: explicit if given, otherwise [W − W/5, H/2].
    pub fn start_cell(&self) -> Position {
        self.start
            .unwrap_or([self.shape[0] - self.shape[0] / 5, self.shape[1] / 2])
    }

    pub fn validate(&self) -> Result<()> {
        if self.shape.iter().any(|&n| n < 3) {
            return Err(Error::config(format!(
                "grid axes must be at least 3 cells, got {:?}",
                self.shape
            )));
        }
        if self.nhits < 2 {
            return Err(Error::config(format!(
                "nhits must be at least 2, got {}",
                self.nhits
            )));
        }
        if self.initial_hit > self.nhits - 1 {
            return Err(Error::config(format!(
                "initial_hit {} cannot exceed nhits - 1 = {}",
                self.initial_hit,
                self.nhits - 1
            )));
        }
        for (name, value) in [
            ("emission_rate", self.emission_rate),
            ("wind_speed", self.wind_speed),
            ("coherence_time", self.coherence_time),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::config(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        let start = self.start_cell();
        if start[0] >= self.shape[0] || start[1] >= self.shape[1] {
            return Err(Error::config(format!(
                "start cell {start:?} is outside the {:?} grid",
                self.shape
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EnvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.start_cell(), [65, 20]);
    }

    #[test]
    fn initial_hit_must_fit_bucket_count() {
        let config = EnvConfig::default().with_nhits(2).with_initial_hit(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_start_must_be_in_bounds() {
        let config = EnvConfig::default().with_shape(9, 7).with_start([9, 0]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EnvConfig::default().with_shape(21, 11).with_seed(7);
        let json = serde_json::to_string(&config).unwrap();
        let back: EnvConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.shape, [21, 11]);
        assert_eq!(back.seed, Some(7));
    }
}
