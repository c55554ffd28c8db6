//! Regularization penalties
//!
//! Computes the named scalar penalty terms the loss-aggregation stage
//! consumes. A table contributes at most one term per call, appended to
//! the base list it receives from the surrounding model. Penalties are
//! computed over the raw parameter rows: dropout never touches this
//! path.

use std::collections::HashMap;

use ndarray::{s, Array2, ArrayView2};

use crate::config::{RegularizeMode, Space};
use crate::embedder::table::EmbeddingTable;
use crate::error::{IncrustarError, Result};

/// A named scalar penalty contribution.
pub type PenaltyTerm = (String, f32);

/// Keeps the magnitude gradient finite at the origin.
const COMPLEX_EPS: f32 = 1e-14;

/// Append this table's penalty term to `base`.
///
/// With mode `none` or zero weight the base list passes through
/// unchanged. In weighted mode the per-batch ids in `touched` determine
/// which rows are penalized and how strongly; `touched` is ignored in
/// unweighted mode. The term is named `<key>.L<p>_penalty`.
pub fn penalty(
    table: &EmbeddingTable,
    base: Vec<PenaltyTerm>,
    touched: Option<&[usize]>,
) -> Result<Vec<PenaltyTerm>> {
    let cfg = table.config();
    let weight = cfg.regularize_weight;

    let mut result = base;
    match cfg.regularize {
        RegularizeMode::None => {}
        _ if weight == 0.0 => {}
        mode => {
            let p = if mode == RegularizeMode::N3 {
                if cfg.space != Space::Complex {
                    return Err(IncrustarError::ComplexSpaceRequired { mode: mode.to_string() });
                }
                3.0
            } else {
                cfg.regularize_args.p
            };

            let value = if cfg.regularize_args.weighted {
                match touched {
                    Some(indexes) if !indexes.is_empty() => {
                        Some(weighted_term(table, cfg.space, p, weight, indexes)?)
                    }
                    // an empty batch contributes nothing
                    _ => None,
                }
            } else {
                Some(unweighted_term(table, cfg.space, p, weight))
            };

            if let Some(value) = value {
                let name = format!("{}.L{}_penalty", table.key(), degree_label(p));
                result.push((name, value));
            }
        }
    }

    Ok(result)
}

/// `weight/p * sum(|v|^p)` over the entire table.
fn unweighted_term(table: &EmbeddingTable, space: Space, p: f32, weight: f32) -> f32 {
    let sum: f32 = match space {
        Space::Complex => abs_complex(table.weights()).mapv(|m| m.powf(p)).sum(),
        Space::Euclidean => table.weights().mapv(|v| v.abs().powf(p)).sum(),
    };
    weight / p * sum
}

/// Weighted variant: each unique touched row contributes once per
/// occurrence, and the total is divided by the batch length so the
/// expectation over random batches matches the unweighted term.
fn weighted_term(
    table: &EmbeddingTable,
    space: Space,
    p: f32,
    weight: f32,
    touched: &[usize],
) -> Result<f32> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for &index in touched {
        *counts.entry(index).or_insert(0) += 1;
    }
    let unique: Vec<usize> = counts.keys().copied().collect();
    let rows = table.rows(&unique)?;

    let per_row: Vec<f32> = match space {
        Space::Complex => abs_complex(rows.view())
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|m| m.powf(p)).sum())
            .collect(),
        Space::Euclidean => rows
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|v| v.abs().powf(p)).sum())
            .collect(),
    };

    let total: f32 = unique
        .iter()
        .zip(per_row)
        .map(|(id, row_sum)| row_sum * counts[id] as f32)
        .sum();

    Ok(weight / p * total / touched.len() as f32)
}

/// Reduce rows of `2k` raw values to `k` complex magnitudes
/// `sqrt(re^2 + im^2 + eps)`. The first half of each row holds real
/// parts, the second half imaginary parts. The underlying table is
/// untouched; this is a computation-local view.
fn abs_complex(rows: ArrayView2<'_, f32>) -> Array2<f32> {
    let k = rows.ncols() / 2;
    let re = rows.slice(s![.., ..k]);
    let im = rows.slice(s![.., k..]);
    let mut out = Array2::zeros((rows.nrows(), k));
    for ((i, j), v) in out.indexed_iter_mut() {
        *v = (re[[i, j]].powi(2) + im[[i, j]].powi(2) + COMPLEX_EPS).sqrt();
    }
    out
}

fn degree_label(p: f32) -> String {
    if p.fract() == 0.0 {
        format!("{}", p as i64)
    } else {
        format!("{p}")
    }
}
