//! Vector similarity utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Top-k ranking of embedded passages against a query vector

use vcassist_core::retrieval::RetrievedPassage;

/// A passage together with its embedding.
#[derive(Debug, Clone)]
pub struct EmbeddedPassage {
    pub passage: RetrievedPassage,
    pub embedding: Vec<f32>,
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank passages by cosine similarity to a query embedding.
///
/// Returns at most `limit` passages, most similar first, dropping anything
/// scoring below `min_score`. Ties keep insertion order.
pub fn rank_passages(
    entries: &[EmbeddedPassage],
    query_embedding: &[f32],
    limit: usize,
    min_score: f32,
) -> Vec<(f32, RetrievedPassage)> {
    let mut scored: Vec<(f32, RetrievedPassage)> = entries
        .iter()
        .filter_map(|entry| {
            let sim = cosine_similarity(&entry.embedding, query_embedding);
            (sim >= min_score).then(|| (sim, entry.passage.clone()))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}
