//! Row normalization
//!
//! Rescales every table row to unit Lp norm. The training loop invokes
//! this at two points through the hook registry: once right after
//! construction/initialization and once after every batch. The
//! operation runs with gradient recording suspended and is idempotent:
//! rows that are already unit norm stay put.

use ndarray::ArrayView1;

use crate::config::EmbedderConfig;
use crate::embedder::table::EmbeddingTable;
use crate::grad::no_grad;
use crate::hooks::{EmbedderHook, HookRegistry};

/// Rows with a norm below this are left untouched rather than divided
/// toward infinity.
const MIN_NORM: f32 = 1e-12;

/// Unit-Lp row rescaling operator.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    p: f32,
}

impl Normalizer {
    /// Normalizer of degree `p`. A degree of 0 disables normalization.
    pub fn new(p: f32) -> Self {
        Self { p }
    }

    pub fn from_config(config: &EmbedderConfig) -> Self {
        Self::new(config.normalize_p)
    }

    pub fn is_enabled(&self) -> bool {
        self.p > 0.0
    }

    /// Rescale every row of `table` to unit Lp norm in place.
    ///
    /// No-op when the degree is 0. Never contributes to parameter
    /// gradients.
    pub fn normalize_rows(&self, table: &mut EmbeddingTable) {
        if !self.is_enabled() {
            return;
        }
        let p = self.p;
        no_grad(|| {
            for mut row in table.weights_mut().outer_iter_mut() {
                let norm = lp_norm(row.view(), p);
                if norm > MIN_NORM {
                    row.mapv_inplace(|v| v / norm);
                }
            }
        });
    }

    /// Register normalization at both lifecycle points ("run start",
    /// "post batch") when enabled. The external loop drives dispatch.
    pub fn register(self, registry: &mut HookRegistry) {
        if self.is_enabled() {
            registry.register(NormalizeHook { normalizer: self });
        }
    }
}

fn lp_norm(row: ArrayView1<'_, f32>, p: f32) -> f32 {
    if p == 2.0 {
        row.iter().map(|v| v * v).sum::<f32>().sqrt()
    } else {
        row.iter().map(|v| v.abs().powf(p)).sum::<f32>().powf(1.0 / p)
    }
}

struct NormalizeHook {
    normalizer: Normalizer,
}

impl EmbedderHook for NormalizeHook {
    fn on_run_start(&mut self, table: &mut EmbeddingTable) {
        self.normalizer.normalize_rows(table);
    }

    fn on_post_batch(&mut self, table: &mut EmbeddingTable) {
        self.normalizer.normalize_rows(table);
    }

    fn name(&self) -> &'static str {
        "normalize_rows"
    }
}
