//! Embedder configuration
//!
//! Plain serde-deserializable structs validated before any table is
//! constructed. Validation checks ranges and enum combinations; it never
//! touches the filesystem.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IncrustarError, Result};

/// Value space the embedding rows are interpreted in.
///
/// `Complex` rows encode `k` complex numbers as `2k` reals: the first
/// half of the row holds the real parts, the second half the imaginary
/// parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Space {
    #[default]
    Euclidean,
    Complex,
}

impl FromStr for Space {
    type Err = IncrustarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "euclidean" => Ok(Self::Euclidean),
            "complex" => Ok(Self::Complex),
            other => Err(IncrustarError::InvalidSpace(other.into())),
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Euclidean => write!(f, "euclidean"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// Regularization penalty mode.
///
/// The empty string deserializes to `None` (no penalty term), matching
/// the convention of leaving the option unset in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegularizeMode {
    #[default]
    #[serde(rename = "")]
    None,
    Lp,
    N3,
}

impl FromStr for RegularizeMode {
    type Err = IncrustarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(Self::None),
            "lp" => Ok(Self::Lp),
            "n3" => Ok(Self::N3),
            other => Err(IncrustarError::InvalidRegularizer(other.into())),
        }
    }
}

impl fmt::Display for RegularizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::Lp => write!(f, "lp"),
            Self::N3 => write!(f, "n3"),
        }
    }
}

/// Arguments for the Lp penalty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularizeArgs {
    /// Norm degree. Ignored and fixed to 3 when the mode is `n3`.
    #[serde(default = "default_degree")]
    pub p: f32,
    /// Weight each unique row by its occurrence count in the batch
    /// instead of penalizing the whole table.
    #[serde(default)]
    pub weighted: bool,
}

fn default_degree() -> f32 {
    2.0
}

impl Default for RegularizeArgs {
    fn default() -> Self {
        Self { p: default_degree(), weighted: false }
    }
}

/// Configuration for one embedding table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Requested embedding dimension, before rounding.
    pub dim: usize,
    /// Allowed dimensions to round `dim` up to. Empty disables rounding.
    #[serde(default)]
    pub round_dim_to: Vec<usize>,
    /// Value space of the rows.
    #[serde(default)]
    pub space: Space,
    /// Row-normalization degree. 0 disables normalization.
    #[serde(default)]
    pub normalize_p: f32,
    /// Penalty mode.
    #[serde(default)]
    pub regularize: RegularizeMode,
    /// Penalty weight. 0 disables the term even when a mode is set.
    #[serde(default)]
    pub regularize_weight: f32,
    #[serde(default)]
    pub regularize_args: RegularizeArgs,
    /// Advisory flag for the external optimizer: gradients for this
    /// table are sparse (only touched rows receive updates).
    #[serde(default)]
    pub sparse: bool,
    /// Dropout rate applied to every lookup. 0 disables.
    #[serde(default)]
    pub dropout: f32,
    /// Permit silent correction of out-of-range values where a safe
    /// substitute exists (currently: negative dropout becomes 0).
    #[serde(default)]
    pub auto_correct: bool,
    /// Aggregation threshold. A value <= 0 disables neighbour
    /// aggregation entirely and the edge-list file is never read.
    #[serde(default)]
    pub psi: f32,
    /// Edge-list resource, relative to the dataset root. Required when
    /// `psi > 0`.
    #[serde(default)]
    pub neighbour_edgelist_file: Option<PathBuf>,
}

impl EmbedderConfig {
    /// Minimal configuration for a table of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            round_dim_to: Vec::new(),
            space: Space::default(),
            normalize_p: 0.0,
            regularize: RegularizeMode::default(),
            regularize_weight: 0.0,
            regularize_args: RegularizeArgs::default(),
            sparse: false,
            dropout: 0.0,
            auto_correct: false,
            psi: 0.0,
            neighbour_edgelist_file: None,
        }
    }

    /// Validate ranges and enum combinations.
    ///
    /// Mutates `self` only for auto-corrected values (negative dropout
    /// with `auto_correct` set). Any other violation is fatal.
    pub fn validate(&mut self) -> Result<()> {
        if self.dim == 0 {
            return Err(IncrustarError::config("dim", "0 (must be > 0)"));
        }

        if self.normalize_p < 0.0 {
            return Err(IncrustarError::config(
                "normalize_p",
                format!("{} (must be >= 0.0)", self.normalize_p),
            ));
        }

        if self.regularize == RegularizeMode::N3 && self.space != Space::Complex {
            return Err(IncrustarError::ComplexSpaceRequired { mode: "n3".into() });
        }

        if self.regularize_weight < 0.0 {
            return Err(IncrustarError::config(
                "regularize_weight",
                format!("{} (must be >= 0.0)", self.regularize_weight),
            ));
        }

        if self.regularize_args.p <= 0.0 {
            return Err(IncrustarError::config(
                "regularize_args.p",
                format!("{} (must be > 0.0)", self.regularize_args.p),
            ));
        }

        if self.dropout < 0.0 {
            if self.auto_correct {
                warn!(dropout = self.dropout, "correcting negative dropout to 0.0");
                self.dropout = 0.0;
            } else {
                return Err(IncrustarError::config(
                    "dropout",
                    format!("{} (must be in [0.0, 1.0))", self.dropout),
                ));
            }
        }
        if self.dropout >= 1.0 {
            return Err(IncrustarError::config(
                "dropout",
                format!("{} (must be in [0.0, 1.0))", self.dropout),
            ));
        }

        if self.psi > 0.0 && self.neighbour_edgelist_file.is_none() {
            return Err(IncrustarError::config(
                "neighbour_edgelist_file",
                "missing (required when psi > 0)",
            ));
        }

        Ok(())
    }

    /// The dimension rows are actually allocated with: `dim` rounded up
    /// to the nearest entry of `round_dim_to`, or `dim` unchanged when
    /// the list is empty.
    pub fn effective_dim(&self) -> Result<usize> {
        if self.round_dim_to.is_empty() {
            return Ok(self.dim);
        }
        let mut points = self.round_dim_to.clone();
        points.sort_unstable();
        points
            .into_iter()
            .find(|&p| p >= self.dim)
            .ok_or_else(|| {
                IncrustarError::config(
                    "round_dim_to",
                    format!("no entry >= dim {} in {:?}", self.dim, self.round_dim_to),
                )
            })
    }
}
