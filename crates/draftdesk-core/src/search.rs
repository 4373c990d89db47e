//! Cosine-similarity ranking over a [`CorpusIndex`].
//!
//! # Ordering
//!
//! 1. Score every indexed document: `cosine(query, document)`.
//! 2. Drop hits below `min_score`.
//! 3. Sort by score (desc), then corpus insertion order (asc).
//! 4. Truncate to `k`.
//!
//! A zero query vector, `k == 0`, or an empty index all yield an empty
//! result list rather than an error.

use serde::Serialize;

use crate::index::CorpusIndex;
use crate::vectorize::TermVector;

/// One ranked document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    /// Cosine similarity in `[0.0, 1.0]`.
    pub score: f64,
}

/// Ranking knobs beyond the result count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of hits.
    pub k: usize,
    /// Hits scoring below this are dropped.
    pub min_score: f64,
}

impl SearchOptions {
    pub fn top(k: usize) -> Self {
        Self { k, min_score: 0.0 }
    }
}

/// Cosine similarity of two sparse vectors.
///
/// Returns `0.0` when either vector is the zero vector.
pub fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let denom = a.norm() * b.norm();
    if denom < f64::EPSILON {
        return 0.0;
    }
    // Rounding can push identical vectors a hair past 1.0.
    (a.dot(b) / denom).clamp(0.0, 1.0)
}

/// Rank the index against `query`, returning at most `k` hits.
pub fn search(index: &CorpusIndex, query: &TermVector, k: usize) -> Vec<SearchHit> {
    search_with(index, query, SearchOptions::top(k))
}

pub fn search_with(index: &CorpusIndex, query: &TermVector, options: SearchOptions) -> Vec<SearchHit> {
    if query.is_zero() || options.k == 0 || index.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, SearchHit)> = index
        .entries()
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            (
                position,
                SearchHit {
                    document_id: entry.document_id.clone(),
                    score: cosine(query, &entry.vector),
                },
            )
        })
        .filter(|(_, hit)| hit.score >= options.min_score)
        .collect();

    scored.sort_by(|(pa, a), (pb, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(pa.cmp(pb))
    });
    scored.truncate(options.k);

    scored.into_iter().map(|(_, hit)| hit).collect()
}
