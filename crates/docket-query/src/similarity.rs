//! Exact cosine similarity search.
//!
//! Every stored vector is scored against the query; there is no index. The
//! result order is total: score descending, then row (insertion order)
//! ascending, with NaN scores last.

use docket_core::CollectionSnapshot;
use std::cmp::Ordering;
use tracing::warn;

const EPS: f64 = 1e-12;

/// One ranked row of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// Row index in the snapshot
    pub row: usize,
    pub id: String,
    pub score: f32,
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

/// Cosine similarity of `a` and `b`, computed as `dot(a / (|a| + eps), b / (|b| + eps))`.
///
/// Vectors of different length score `0.0`.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    (dot(a, b) / ((norm(a) + EPS) * (norm(b) + EPS))) as f32
}

fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    match (a.1.is_nan(), b.1.is_nan()) {
        (false, false) => b
            .1
            .partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0)),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => a.0.cmp(&b.0),
    }
}

/// Top-`top_k` rows of `snapshot` by cosine similarity to `query`.
///
/// Returns `min(top_k, snapshot.len())` candidates. A query whose length does
/// not match the collection dimension yields nothing.
#[must_use]
pub fn search(snapshot: &CollectionSnapshot, query: &[f32], top_k: usize) -> Vec<ScoredCandidate> {
    if top_k == 0 || snapshot.is_empty() {
        return Vec::new();
    }
    if query.len() != snapshot.dimension {
        warn!(
            "Query dimension {} does not match collection '{}' dimension {}",
            query.len(),
            snapshot.name,
            snapshot.dimension
        );
        return Vec::new();
    }

    let query_norm = norm(query) + EPS;
    let mut scored: Vec<(usize, f32)> = (0..snapshot.len())
        .map(|row| {
            let v = snapshot.row(row);
            let score = dot(v, query) / ((norm(v) + EPS) * query_norm);
            (row, score as f32)
        })
        .collect();

    if top_k < scored.len() {
        scored.select_nth_unstable_by(top_k - 1, rank_order);
        scored.truncate(top_k);
    }
    scored.sort_unstable_by(rank_order);

    scored
        .into_iter()
        .map(|(row, score)| ScoredCandidate {
            row,
            id: snapshot.ids[row].clone(),
            score,
        })
        .collect()
}
