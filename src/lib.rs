//! incrustar: embedding-lookup engine for knowledge-graph models
//!
//! Owns the per-entity/relation parameter table of a knowledge-graph
//! representation model and everything that keeps it serviceable:
//! lookups with dropout post-processing, unit-norm row rescaling at
//! training lifecycle points, Lp/N3 regularization penalties for the
//! external optimizer, neighbour-mean fallback embeddings for
//! out-of-sample entities, and one-shot transplantation of pretrained
//! rows.
//!
//! The training loop, optimizer, and autodiff engine live outside this
//! crate. They drive the table through three seams: the
//! [`hooks::HookRegistry`] they own and invoke, the penalty terms they
//! fold into the loss, and the [`grad::no_grad`] marker they consult
//! before taping mutations.
//!
//! # Example
//!
//! ```
//! use incrustar::{Embedder, EmbedderConfig, EmbeddingTable, Normalizer};
//!
//! let mut config = EmbedderConfig::new(8);
//! config.normalize_p = 2.0;
//!
//! let mut table = EmbeddingTable::new("entity", &config, 100)?;
//! table.initialize_with(|w| w.fill(0.1));
//! Normalizer::from_config(&config).normalize_rows(&mut table);
//!
//! let rows = table.embed(&[3, 17, 3])?;
//! assert_eq!(rows.dim(), (3, 8));
//! # Ok::<(), incrustar::IncrustarError>(())
//! ```

pub mod config;
pub mod embedder;
pub mod error;
pub mod grad;
pub mod hooks;

pub use config::{EmbedderConfig, RegularizeArgs, RegularizeMode, Space};
pub use embedder::aggregate::{load_edge_list, NeighbourAdjacency, NeighbourAggregator};
pub use embedder::normalize::Normalizer;
pub use embedder::pretrained::{transplant, PretrainedMapping};
pub use embedder::regularize::{penalty, PenaltyTerm};
pub use embedder::table::{uniform_init, Dropout, EmbeddingTable};
pub use embedder::Embedder;
pub use error::{IncrustarError, Result};
pub use grad::{is_recording, no_grad, NoGradGuard};
pub use hooks::{EmbedderHook, HookRegistry};
