//! Error types for the source-tracking crate

use thiserror::Error;

/// Main error type for the source-tracking crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("grid has {dims} axes (supported: 1 to 4, implemented: 2)")]
    InvalidDimension { dims: usize },

    #[error("action {action} is outside the valid range 0..{limit}")]
    InvalidAction { action: usize, limit: usize },

    #[error(
        "kernel axis {axis} has spatial extent {len} (expected {} or {} for a grid axis of {dim})",
        2 * dim - 1,
        2 * dim + 1
    )]
    InvalidKernelShape { axis: usize, len: usize, dim: usize },

    #[error("hit probabilities sum to {sum}, expected 1 within tolerance")]
    LikelihoodInconsistency { sum: f64 },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for Results using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for an `InvalidConfiguration` with a formatted message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            operation: "IO operation".to_string(),
            source,
        }
    }
}
