//! Vector similarity and ranking utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Candidate-pool ranking with a score threshold and result cap

use newsdesk_core::RetrievedArticle;
pub use newsdesk_core::index::{by_score_desc, threshold_and_rank};

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

/// Score every `(article, embedding)` pair against `query` and rank them.
///
/// The `num_candidates` nearest neighbours form the candidate pool; the
/// threshold and cap are applied to that pool.
pub fn rank_by_similarity<'a, I>(
    items: I,
    query: &[f32],
    num_candidates: usize,
    min_score: f32,
    limit: usize,
) -> Vec<RetrievedArticle>
where
    I: IntoIterator<Item = (&'a RetrievedArticle, &'a [f32])>,
{
    let mut pool: Vec<RetrievedArticle> = items
        .into_iter()
        .map(|(article, embedding)| {
            let mut a = article.clone();
            a.score = cosine_similarity(embedding, query);
            a
        })
        .collect();

    pool.sort_by(by_score_desc);
    pool.truncate(num_candidates);
    threshold_and_rank(pool, min_score, limit)
}
