//! Embedding-table components
//!
//! The table itself, row normalization, penalty computation, neighbour
//! aggregation for out-of-sample ids, and pretrained-row transplantation.

pub mod aggregate;
pub mod normalize;
pub mod pretrained;
pub mod regularize;
pub mod table;

use ndarray::Array2;

use crate::error::Result;

/// Capability exposed by anything that can serve embedding rows.
///
/// Implemented by [`table::EmbeddingTable`]; the pretrained transplant
/// accepts any `&dyn Embedder` as its source, so a table can adopt rows
/// from a differently backed embedder as long as the row width matches.
pub trait Embedder {
    /// One row per requested id, in request order.
    fn embed(&self, indexes: &[usize]) -> Result<Array2<f32>>;

    /// Every row in id order.
    fn embed_all(&self) -> Array2<f32>;

    /// Number of ids this embedder can serve.
    fn vocab_size(&self) -> usize;

    /// Row width.
    fn dim(&self) -> usize;
}
