//! Retrieval engine: embed the rewritten query, then run one thresholded
//! vector search.

use std::sync::Arc;

use newsdesk_config::RetrievalConfig;
use newsdesk_core::provider::EmbeddingRequest;
use newsdesk_core::{Provider, RetrievalError, RetrievedArticle, VectorIndex, VectorQuery};
use tracing::{debug, info};

pub struct RetrievalEngine {
    provider: Arc<dyn Provider>,
    index: Arc<dyn VectorIndex>,
    embedding_model: String,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        index: Arc<dyn VectorIndex>,
        embedding_model: impl Into<String>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            index,
            embedding_model: embedding_model.into(),
            config,
        }
    }

    /// Embed `query` as a single-element batch.
    pub async fn embed(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await?;

        let vector = response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(RetrievalError::EmptyEmbedding)?;

        if vector.len() != self.config.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Ranked articles for `query`; an empty list means nothing qualified.
    ///
    /// Threshold, order and cap are enforced here regardless of backend.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedArticle>, RetrievalError> {
        let vector = self.embed(query).await?;
        let vector_query = VectorQuery {
            vector,
            num_candidates: self.config.num_candidates,
            limit: self.config.limit,
            min_score: self.config.min_score,
        };

        let raw = self.index.search(&vector_query).await?;
        let returned = raw.len();
        let articles = vector_query.select(raw);

        debug!(
            backend = self.index.name(),
            returned,
            kept = articles.len(),
            "Vector search complete"
        );
        if let Some(best) = articles.first() {
            info!(count = articles.len(), top_score = best.score, "Found relevant articles");
        }

        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{article, ScriptedIndex, SequentialMockProvider};
    use newsdesk_core::{IndexError, ProviderError, Stage};

    fn config(dimension: usize) -> RetrievalConfig {
        RetrievalConfig {
            dimension,
            ..RetrievalConfig::default()
        }
    }

    fn engine(
        provider: Arc<SequentialMockProvider>,
        index: Arc<ScriptedIndex>,
        dimension: usize,
    ) -> RetrievalEngine {
        RetrievalEngine::new(provider, index, "text-embedding-ada-002", config(dimension))
    }

    #[tokio::test]
    async fn query_carries_configured_parameters() {
        let provider = Arc::new(SequentialMockProvider::new());
        provider.push_embedding(vec![0.1, 0.2, 0.3]);
        let index = Arc::new(ScriptedIndex::returning(vec![article("a", 0.9)]));

        let results = engine(provider.clone(), index.clone(), 3)
            .retrieve("Mars rover landing")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let queries = index.queries.lock().unwrap();
        assert_eq!(queries[0].vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(queries[0].num_candidates, 100);
        assert_eq!(queries[0].limit, 5);
        assert!((queries[0].min_score - 0.70).abs() < f32::EPSILON);

        let embeds = provider.embed_requests.lock().unwrap();
        assert_eq!(embeds[0].inputs, vec!["Mars rover landing".to_string()]);
        assert_eq!(embeds[0].model, "text-embedding-ada-002");
    }

    #[tokio::test]
    async fn results_are_thresholded_sorted_and_capped() {
        let provider = Arc::new(SequentialMockProvider::new());
        provider.push_embedding(vec![1.0, 0.0]);
        let index = Arc::new(ScriptedIndex::returning(vec![
            article("low", 0.40),
            article("b", 0.71),
            article("a", 0.99),
            article("c", 0.85),
            article("d", 0.80),
            article("e", 0.75),
            article("f", 0.72),
            article("edge", 0.69),
        ]));

        let results = engine(provider, index, 2).retrieve("q").await.unwrap();
        let ids: Vec<&str> = results.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "d", "e", "f"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|a| a.score >= 0.70));
    }

    #[tokio::test]
    async fn nothing_above_threshold_is_empty_not_error() {
        let provider = Arc::new(SequentialMockProvider::new());
        provider.push_embedding(vec![1.0]);
        let index = Arc::new(ScriptedIndex::returning(vec![article("weak", 0.5)]));
        let results = engine(provider, index, 1).retrieve("q").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_stops_before_search() {
        let provider = Arc::new(SequentialMockProvider::new());
        provider.push_embedding(vec![1.0, 2.0]);
        let index = Arc::new(ScriptedIndex::returning(vec![]));

        let err = engine(provider, index.clone(), 1536).retrieve("q").await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch { expected: 1536, actual: 2 }
        ));
        assert_eq!(index.query_count(), 0);
    }

    #[tokio::test]
    async fn empty_vector_rejected() {
        let provider = Arc::new(SequentialMockProvider::new());
        provider.push_embedding(vec![]);
        let index = Arc::new(ScriptedIndex::returning(vec![]));
        let err = engine(provider, index, 3).retrieve("q").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyEmbedding));
    }

    #[tokio::test]
    async fn failures_map_to_their_stage() {
        let provider = Arc::new(SequentialMockProvider::new());
        provider.push_embedding_error(ProviderError::RateLimited { retry_after_secs: 5 });
        let index = Arc::new(ScriptedIndex::returning(vec![]));
        let err = engine(provider, index, 3).retrieve("q").await.unwrap_err();
        assert_eq!(err.stage(), Stage::Embedding);

        let provider = Arc::new(SequentialMockProvider::new());
        provider.push_embedding(vec![1.0]);
        let index = Arc::new(ScriptedIndex::failing(IndexError::Request("503".into())));
        let err = engine(provider, index, 1).retrieve("q").await.unwrap_err();
        assert_eq!(err.stage(), Stage::Search);
    }
}
