//! Vector index trait — approximate nearest-neighbour search over articles.

use async_trait::async_trait;

use crate::article::RetrievedArticle;
use crate::error::IndexError;

/// A single similarity query.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    /// Query embedding.
    pub vector: Vec<f32>,

    /// Candidate pool examined before scoring (ANN breadth).
    pub num_candidates: usize,

    /// Maximum number of results returned.
    pub limit: usize,

    /// Results scoring below this are dropped.
    pub min_score: f32,
}

impl VectorQuery {
    /// Apply this query's threshold and cap to a backend's results.
    pub fn select(&self, articles: Vec<RetrievedArticle>) -> Vec<RetrievedArticle> {
        threshold_and_rank(articles, self.min_score, self.limit)
    }
}

/// Descending score order; NaN compares equal.
pub fn by_score_desc(a: &RetrievedArticle, b: &RetrievedArticle) -> std::cmp::Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
}

/// Keep articles scoring at least `min_score`, best first, at most `limit`.
///
/// The sort is stable, so equal scores keep their incoming order.
pub fn threshold_and_rank(
    mut articles: Vec<RetrievedArticle>,
    min_score: f32,
    limit: usize,
) -> Vec<RetrievedArticle> {
    articles.retain(|a| a.score >= min_score);
    articles.sort_by(by_score_desc);
    articles.truncate(limit);
    articles
}

/// Backend holding pre-embedded articles.
///
/// Implementations should return at most `limit` articles with
/// `score >= min_score`, best first. Callers re-apply those rules, so a
/// backend that over-returns is tolerated.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name for logs (e.g., "memory", "atlas").
    fn name(&self) -> &str;

    async fn search(&self, query: &VectorQuery) -> Result<Vec<RetrievedArticle>, IndexError>;

    /// Can we reach the backend?
    async fn health_check(&self) -> Result<bool, IndexError> {
        Ok(true)
    }
}
