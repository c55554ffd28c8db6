//! Error types for the embedding engine.
//!
//! Every variant carries the offending value and, where it helps, the
//! accepted range, so a failed construction can be diagnosed from the
//! message alone.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for incrustar operations.
pub type Result<T> = std::result::Result<T, IncrustarError>;

/// Errors raised by table construction, lookup, and penalty computation.
#[derive(Debug, Error)]
pub enum IncrustarError {
    /// A configuration value failed validation before construction.
    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// Unsupported embedding space name.
    #[error("Invalid embedding space: {0} (must be one of: euclidean, complex)")]
    InvalidSpace(String),

    /// Unsupported regularization mode name.
    #[error("Invalid value regularize={0} (must be one of: \"\", lp, n3)")]
    InvalidRegularizer(String),

    /// A complex-space-only regularizer was requested for a real-valued table.
    #[error("Regularizer '{mode}' requires a complex embedding space")]
    ComplexSpaceRequired { mode: String },

    /// Lookup id outside the table's vocabulary.
    #[error("Embedding index {index} out of range for vocabulary of size {vocab_size}")]
    IndexOutOfRange { index: usize, vocab_size: usize },

    /// The neighbour edge-list resource could not be read or parsed.
    #[error("Failed to load neighbour edge list {path}: {message}")]
    EdgeList { path: PathBuf, message: String },

    /// Row width conflict between two embedding tables.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimMismatch { expected: usize, actual: usize },

    /// A pretrained id mapping violated its invariants.
    #[error("Invalid pretrained mapping: {0}")]
    InvalidMapping(String),
}

impl IncrustarError {
    /// Create an `InvalidConfig` error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig { field: field.into(), message: message.into() }
    }

    /// Create an `EdgeList` error from any underlying cause.
    pub fn edge_list(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::EdgeList { path: path.into(), message: message.into() }
    }
}
