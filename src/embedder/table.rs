//! Embedding table
//!
//! Owns the V×D parameter array, one row per entity or relation id.
//! Lookups go through [`EmbeddingTable::embed`], which applies the
//! stochastic dropout post-processing step; the raw rows back the
//! penalty, aggregation, and transplant paths. Gradient accumulation
//! during training is the external optimizer's concern, not managed
//! here.

use std::sync::{Mutex, PoisonError};

use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{EmbedderConfig, Space};
use crate::embedder::Embedder;
use crate::error::{IncrustarError, Result};

/// Inverted dropout over lookup results.
///
/// Each entry is zeroed with probability `rate` and survivors are
/// scaled by `1/(1-rate)`, so lookups are unbiased in expectation.
/// Stateless per call: nothing about a draw is persisted.
pub struct Dropout {
    rate: f32,
    rng: Mutex<StdRng>,
}

impl Dropout {
    /// Dropout with the given rate. A rate of 0 is a no-op.
    pub fn new(rate: f32) -> Self {
        Self { rate, rng: Mutex::new(StdRng::from_os_rng()) }
    }

    /// Dropout with a deterministic RNG, for reproducible runs.
    pub fn seeded(rate: f32, seed: u64) -> Self {
        Self { rate, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Apply dropout in place.
    pub fn apply(&self, rows: &mut Array2<f32>) {
        if self.rate <= 0.0 {
            return;
        }
        let scale = 1.0 / (1.0 - self.rate);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        for v in rows.iter_mut() {
            if rng.random::<f32>() < self.rate {
                *v = 0.0;
            } else {
                *v *= scale;
            }
        }
    }
}

/// The V×D embedding parameter table.
///
/// Constructed once at model build time and never resized. Initial
/// values come from [`initialize_with`](Self::initialize_with) (skipped
/// when restoring from saved state via
/// [`load_weights`](Self::load_weights)). Rows are mutated by external
/// gradient updates, by row normalization, and by pretrained
/// transplantation.
pub struct EmbeddingTable {
    key: String,
    vocab_size: usize,
    dim: usize,
    sparse: bool,
    weights: Array2<f32>,
    dropout: Dropout,
    config: EmbedderConfig,
}

impl EmbeddingTable {
    /// Allocate a zeroed table for `vocab_size` ids.
    ///
    /// `key` namespaces this table's penalty terms. The configured
    /// dimension is rounded up through `round_dim_to` before
    /// allocation. Fails on any configuration violation.
    pub fn new(key: impl Into<String>, config: &EmbedderConfig, vocab_size: usize) -> Result<Self> {
        if vocab_size == 0 {
            return Err(IncrustarError::config("vocab_size", "0 (must be > 0)"));
        }
        let mut config = config.clone();
        config.validate()?;
        let dim = config.effective_dim()?;
        if config.space == Space::Complex && dim % 2 != 0 {
            return Err(IncrustarError::config(
                "dim",
                format!("{dim} (complex space requires an even dimension)"),
            ));
        }
        let dropout = Dropout::new(config.dropout);
        Ok(Self {
            key: key.into(),
            vocab_size,
            dim,
            sparse: config.sparse,
            weights: Array2::zeros((vocab_size, dim)),
            dropout,
            config,
        })
    }

    /// Run the externally supplied initialization routine over the raw
    /// weight array. Not called when the table is restored from saved
    /// state.
    pub fn initialize_with<F>(&mut self, init: F)
    where
        F: FnOnce(&mut Array2<f32>),
    {
        init(&mut self.weights);
    }

    /// Adopt a full weight array, e.g. from a checkpoint. The shape
    /// must match the allocated table exactly.
    pub fn load_weights(&mut self, weights: Array2<f32>) -> Result<()> {
        if weights.nrows() != self.vocab_size || weights.ncols() != self.dim {
            return Err(IncrustarError::DimMismatch {
                expected: self.vocab_size * self.dim,
                actual: weights.nrows() * weights.ncols(),
            });
        }
        self.weights = weights;
        Ok(())
    }

    /// Reseed the dropout RNG for reproducible lookups.
    pub fn seed_dropout(&mut self, seed: u64) {
        self.dropout = Dropout::seeded(self.config.dropout, seed);
    }

    /// Raw rows without post-processing, one per requested id.
    pub(crate) fn rows(&self, indexes: &[usize]) -> Result<Array2<f32>> {
        for &index in indexes {
            if index >= self.vocab_size {
                return Err(IncrustarError::IndexOutOfRange {
                    index,
                    vocab_size: self.vocab_size,
                });
            }
        }
        Ok(self.weights.select(Axis(0), indexes))
    }

    /// Read-only view of the raw weight array.
    pub(crate) fn weights(&self) -> ArrayView2<'_, f32> {
        self.weights.view()
    }

    /// Mutable view of the raw weight array.
    pub(crate) fn weights_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        self.weights.view_mut()
    }

    pub(crate) fn dropout(&self) -> &Dropout {
        &self.dropout
    }

    pub(crate) fn config(&self) -> &EmbedderConfig {
        &self.config
    }

    /// Configuration key namespacing this table's penalty terms.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the external optimizer should treat this table's
    /// gradients as sparse.
    pub fn sparse_gradient(&self) -> bool {
        self.sparse
    }
}

impl Embedder for EmbeddingTable {
    fn embed(&self, indexes: &[usize]) -> Result<Array2<f32>> {
        let mut rows = self.rows(indexes)?;
        self.dropout.apply(&mut rows);
        Ok(rows)
    }

    fn embed_all(&self) -> Array2<f32> {
        let mut rows = self.weights.clone();
        self.dropout.apply(&mut rows);
        rows
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Initialization routine drawing every weight uniformly from
/// `[-bound, bound]`.
pub fn uniform_init<R: Rng>(rng: &mut R, bound: f32) -> impl FnOnce(&mut Array2<f32>) + '_ {
    move |weights: &mut Array2<f32>| {
        for v in weights.iter_mut() {
            *v = (rng.random::<f32>() * 2.0 - 1.0) * bound;
        }
    }
}
