//! Pretrained-row transplantation
//!
//! One-shot adoption of rows from an already trained embedder into a
//! fresh table, keyed by an id mapping the caller computes by
//! intersecting the two vocabularies. Runs before training begins,
//! after random initialization and before the first normalization
//! pass.

use crate::embedder::table::EmbeddingTable;
use crate::embedder::Embedder;
use crate::error::{IncrustarError, Result};
use crate::grad::no_grad;

/// Pairs of matching ids across two vocabularies: `own_ids[i]` in the
/// receiving table corresponds to `pretrained_ids[i]` in the source.
#[derive(Debug, Clone)]
pub struct PretrainedMapping {
    own_ids: Vec<usize>,
    pretrained_ids: Vec<usize>,
}

impl PretrainedMapping {
    /// Validate and build a mapping for a table of `vocab_size` rows.
    ///
    /// The arrays must be equally long and the own ids unique and in
    /// range; ids absent from the mapping keep their initialized rows.
    pub fn new(
        own_ids: Vec<usize>,
        pretrained_ids: Vec<usize>,
        vocab_size: usize,
    ) -> Result<Self> {
        if own_ids.len() != pretrained_ids.len() {
            return Err(IncrustarError::InvalidMapping(format!(
                "id arrays differ in length ({} vs {})",
                own_ids.len(),
                pretrained_ids.len()
            )));
        }
        let mut seen = vec![false; vocab_size];
        for &id in &own_ids {
            if id >= vocab_size {
                return Err(IncrustarError::InvalidMapping(format!(
                    "own id {id} out of range for vocabulary of size {vocab_size}"
                )));
            }
            if seen[id] {
                return Err(IncrustarError::InvalidMapping(format!(
                    "own id {id} appears more than once"
                )));
            }
            seen[id] = true;
        }
        Ok(Self { own_ids, pretrained_ids })
    }

    pub fn len(&self) -> usize {
        self.own_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.own_ids.is_empty()
    }

    pub fn own_ids(&self) -> &[usize] {
        &self.own_ids
    }

    pub fn pretrained_ids(&self) -> &[usize] {
        &self.pretrained_ids
    }
}

/// Copy each mapped pretrained row over the matching own row.
///
/// Runs with gradient recording suspended; the copy must never reach
/// the autodiff tape. Rows without a mapping entry are left at their
/// prior values.
pub fn transplant(
    table: &mut EmbeddingTable,
    pretrained: &dyn Embedder,
    mapping: &PretrainedMapping,
) -> Result<()> {
    if pretrained.dim() != table.dim() {
        return Err(IncrustarError::DimMismatch {
            expected: table.dim(),
            actual: pretrained.dim(),
        });
    }
    if mapping.is_empty() {
        return Ok(());
    }

    let rows = pretrained.embed(mapping.pretrained_ids())?;
    no_grad(|| {
        let mut weights = table.weights_mut();
        for (row, &own) in rows.outer_iter().zip(mapping.own_ids()) {
            weights.row_mut(own).assign(&row);
        }
    });
    Ok(())
}
