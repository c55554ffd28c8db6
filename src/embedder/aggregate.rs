//! Neighbour aggregation for out-of-sample entities
//!
//! Entities with no directly trained row can still be served: if an
//! entity appears as a source in the neighbour adjacency, its embedding
//! is synthesized as the mean of its neighbours' rows. The adjacency is
//! a compressed-row structure built once from an `[E, 2]` edge list and
//! read-only afterwards; candidate membership is a boolean presence
//! array for O(1) tests.

use std::fs;
use std::path::Path;

use ndarray::{Array2, Axis};
use tracing::{debug, info};

use crate::config::EmbedderConfig;
use crate::embedder::table::EmbeddingTable;
use crate::embedder::Embedder;
use crate::error::{IncrustarError, Result};

/// Sparse source→targets relation in CSR form: `row_ptr` offsets into
/// a flat neighbour-id array. Neighbour retrieval is O(degree).
pub struct NeighbourAdjacency {
    num_nodes: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl NeighbourAdjacency {
    /// Build from `(source, target)` pairs. Edge order is irrelevant;
    /// every id must be below `num_nodes`.
    pub fn from_edges(num_nodes: usize, edges: &[[usize; 2]]) -> Result<Self> {
        for &[source, target] in edges {
            if source >= num_nodes || target >= num_nodes {
                return Err(IncrustarError::config(
                    "neighbour_edgelist_file",
                    format!(
                        "edge ({source}, {target}) references an id >= vocab size {num_nodes}"
                    ),
                ));
            }
        }

        let mut sorted = edges.to_vec();
        sorted.sort_unstable_by_key(|edge| edge[0]);

        let mut row_ptr = vec![0; num_nodes + 1];
        let mut col_idx = Vec::with_capacity(edges.len());
        for [source, target] in sorted {
            row_ptr[source + 1] += 1;
            col_idx.push(target);
        }
        for i in 0..num_nodes {
            row_ptr[i + 1] += row_ptr[i];
        }

        Ok(Self { num_nodes, row_ptr, col_idx })
    }

    /// The neighbour ids of `id`, possibly empty.
    pub fn neighbours(&self, id: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[id]..self.row_ptr[id + 1]]
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.col_idx.len()
    }
}

/// Load an edge-list resource: a JSON array of `[source, target]`
/// integer pairs.
pub fn load_edge_list(path: &Path) -> Result<Vec<[usize; 2]>> {
    let data = fs::read_to_string(path)
        .map_err(|e| IncrustarError::edge_list(path, e.to_string()))?;
    serde_json::from_str(&data).map_err(|e| IncrustarError::edge_list(path, e.to_string()))
}

/// Resolves fallback embeddings for out-of-sample ids.
pub struct NeighbourAggregator {
    psi: f32,
    adjacency: NeighbourAdjacency,
    candidates: Vec<bool>,
}

impl NeighbourAggregator {
    /// Build from configuration. Returns `Ok(None)` when `psi <= 0`:
    /// aggregation is disabled and the edge-list file is never read.
    pub fn from_config(
        config: &EmbedderConfig,
        vocab_size: usize,
        dataset_root: &Path,
    ) -> Result<Option<Self>> {
        if config.psi <= 0.0 {
            debug!("neighbour aggregation disabled (psi <= 0)");
            return Ok(None);
        }
        let file = config.neighbour_edgelist_file.as_ref().ok_or_else(|| {
            IncrustarError::config("neighbour_edgelist_file", "missing (required when psi > 0)")
        })?;
        let edges = load_edge_list(&dataset_root.join(file))?;
        let aggregator = Self::from_edges(config.psi, vocab_size, &edges)?;
        info!(
            psi = config.psi,
            nodes = vocab_size,
            edges = edges.len(),
            candidates = aggregator.candidate_count(),
            "built sparse neighbour adjacency"
        );
        Ok(Some(aggregator))
    }

    /// Build directly from an in-memory edge list.
    pub fn from_edges(psi: f32, vocab_size: usize, edges: &[[usize; 2]]) -> Result<Self> {
        let adjacency = NeighbourAdjacency::from_edges(vocab_size, edges)?;
        let mut candidates = vec![false; vocab_size];
        for &[source, _] in edges {
            candidates[source] = true;
        }
        Ok(Self { psi, adjacency, candidates })
    }

    pub fn psi(&self) -> f32 {
        self.psi
    }

    /// O(1) membership test. Every candidate has at least one
    /// neighbour by construction.
    pub fn is_candidate(&self, id: usize) -> bool {
        self.candidates.get(id).copied().unwrap_or(false)
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.iter().filter(|&&c| c).count()
    }

    pub fn adjacency(&self) -> &NeighbourAdjacency {
        &self.adjacency
    }

    /// One row per requested id: the raw row for ordinary ids, the
    /// mean of the raw neighbour rows for candidates. Dropout runs
    /// exactly once, on the merged batch. A batch with no candidates
    /// degenerates to a plain lookup.
    ///
    /// The result is a freshly allocated array; no previously returned
    /// lookup is aliased or mutated.
    pub fn resolve(&self, table: &EmbeddingTable, indexes: &[usize]) -> Result<Array2<f32>> {
        if !indexes.iter().any(|&id| self.is_candidate(id)) {
            return table.embed(indexes);
        }

        let mut merged = table.rows(indexes)?;
        for (pos, &id) in indexes.iter().enumerate() {
            if self.is_candidate(id) {
                // direct row lookup only: neighbours are never
                // themselves aggregated, so resolution is one hop
                let rows = table.rows(self.adjacency.neighbours(id))?;
                if let Some(mean) = rows.mean_axis(Axis(0)) {
                    merged.row_mut(pos).assign(&mean);
                }
            }
        }
        table.dropout().apply(&mut merged);
        Ok(merged)
    }
}
