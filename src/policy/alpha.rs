//! Alpha-vector policy backed by an externally trained value function.
//!
//! A Perseus-style solver produces a finite set of alpha vectors, each a
//! linear function of the belief with an associated action. At decision time
//! the belief is recentered on the agent (translation invariance lets one
//! table serve every agent position) and the action of the alpha vector
//! maximizing the dot product is taken. The table itself is opaque: this
//! module only loads and evaluates it, it never trains one.

use std::{fs::File, io::BufReader, path::Path};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::DecisionPolicy;
use crate::{
    env::SourceTracking,
    error::{Error, Result},
};

/// Persisted value-function document.
///
/// `alphas` is a list of vectors, each a nested row-major array of spatial
/// shape (2W−1) × (2H−1) for a W × H grid; `actions` maps each vector to the
/// action it recommends. The remaining fields describe how the table was
/// trained and are carried for the policy label only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaVectorDocument {
    pub alphas: Vec<Vec<Vec<f64>>>,
    pub actions: Vec<usize>,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub shaping: Option<String>,
    #[serde(default)]
    pub shaping_coef: Option<f64>,
}

/// Policy choosing `actions[argmax_j dot(recentered_belief, alphas[j])]`.
#[derive(Debug, Clone)]
pub struct AlphaVectorPolicy {
    alphas: Vec<Array2<f64>>,
    actions: Vec<usize>,
    label: String,
}

impl AlphaVectorPolicy {
    /// Load a JSON value-function document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            operation: format!("open alpha-vector file {}", path.display()),
            source,
        })?;
        let document: AlphaVectorDocument = serde_json::from_reader(BufReader::new(file))?;
        Self::from_document(document)
    }

    /// Validate and adopt an in-memory document.
    ///
    /// Every vector must share one rectangular shape with odd extents (the
    /// recentered belief has 2n−1 cells per axis); the grid itself is only
    /// known at decision time and is checked there.
    pub fn from_document(document: AlphaVectorDocument) -> Result<Self> {
        if document.alphas.is_empty() {
            return Err(Error::config("alpha-vector table is empty"));
        }
        if document.actions.len() != document.alphas.len() {
            return Err(Error::config(format!(
                "{} alpha vectors but {} actions",
                document.alphas.len(),
                document.actions.len()
            )));
        }
        let rows = document.alphas[0].len();
        let cols = document.alphas[0].first().map_or(0, Vec::len);
        if rows == 0 || cols == 0 || rows % 2 == 0 || cols % 2 == 0 {
            return Err(Error::config(format!(
                "alpha vectors must have odd positive extents, got {rows}x{cols}"
            )));
        }

        let mut alphas = Vec::with_capacity(document.alphas.len());
        for (index, nested) in document.alphas.iter().enumerate() {
            let mut alpha = Array2::zeros((rows, cols));
            if nested.len() != rows {
                return Err(Error::config(format!(
                    "alpha vector {index} has {} rows, expected {rows}",
                    nested.len()
                )));
            }
            for (i, row) in nested.iter().enumerate() {
                if row.len() != cols {
                    return Err(Error::config(format!(
                        "alpha vector {index} row {i} has {} columns, expected {cols}",
                        row.len()
                    )));
                }
                for (j, &value) in row.iter().enumerate() {
                    alpha[[i, j]] = value;
                }
            }
            alphas.push(alpha);
        }

        let label = format!(
            "alpha vectors (discount={}, shaping={}{}, alphas={})",
            document
                .discount
                .map_or_else(|| "?".to_string(), |d| d.to_string()),
            document.shaping_coef.unwrap_or(1.0),
            document.shaping.as_deref().unwrap_or("none"),
            alphas.len()
        );
        Ok(Self {
            alphas,
            actions: document.actions,
            label,
        })
    }

    pub fn num_alphas(&self) -> usize {
        self.alphas.len()
    }

    /// Estimated value of the current belief and the index of the
    /// maximizing alpha vector (strict maximum, first wins on exact ties).
    pub fn value(&self, env: &SourceTracking) -> Result<(f64, usize)> {
        let recentered = recentered_belief(env);
        if recentered.dim() != self.alphas[0].dim() {
            return Err(Error::config(format!(
                "alpha vectors have shape {:?}, recentered belief {:?}",
                self.alphas[0].dim(),
                recentered.dim()
            )));
        }
        let mut best_value = f64::NEG_INFINITY;
        let mut best_index = 0;
        for (index, alpha) in self.alphas.iter().enumerate() {
            let value = (&recentered * alpha).sum();
            if value > best_value {
                best_value = value;
                best_index = index;
            }
        }
        Ok((best_value, best_index))
    }
}

impl DecisionPolicy for AlphaVectorPolicy {
    fn name(&self) -> &str {
        &self.label
    }

    fn choose_action(&mut self, env: &SourceTracking) -> Result<usize> {
        let (_, index) = self.value(env)?;
        Ok(self.actions[index])
    }
}

/// Belief recentered on the agent with wraparound: mass at cell `c` lands at
/// index `(agent − c) mod (2n − 1)` per axis. Equivalent to padding the
/// belief to (2W−1, 2H−1), flipping both axes and rolling by agent + 1.
fn recentered_belief(env: &SourceTracking) -> Array2<f64> {
    let [w, h] = env.grid().shape();
    let (mw, mh) = (2 * w - 1, 2 * h - 1);
    let agent = env.agent();
    let mut recentered = Array2::zeros((mw, mh));
    for ((i, j), &value) in env.belief().view().indexed_iter() {
        let x = (agent[0] + mw - i) % mw;
        let y = (agent[1] + mh - j) % mh;
        recentered[[x, y]] = value;
    }
    recentered
}
