//! In-memory index — brute-force cosine search, useful for testing and
//! small corpora.
//!
//! Articles can be loaded from a JSON file holding either an array of
//! objects or one object per line (JSONL). Each object is an article plus
//! an `embedding` array.

use async_trait::async_trait;
use newsdesk_core::{IndexError, RetrievedArticle, VectorIndex, VectorQuery};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::vector::rank_by_similarity;

/// An article together with its stored embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedArticle {
    #[serde(flatten)]
    pub article: RetrievedArticle,
    pub embedding: Vec<f32>,
}

/// A vector index that keeps everything in a Vec.
pub struct InMemoryIndex {
    entries: Arc<RwLock<Vec<IndexedArticle>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::with_articles(Vec::new())
    }

    pub fn with_articles(entries: Vec<IndexedArticle>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Load pre-embedded articles from disk.
    ///
    /// Corrupted JSONL lines are skipped with a warning; an unreadable file
    /// or a malformed JSON array is an error.
    pub fn load_from_file(path: &Path) -> Result<Self, IndexError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IndexError::NotConfigured(format!("cannot read {}: {e}", path.display()))
        })?;

        let entries = parse_articles(&content)?;
        debug!(path = %path.display(), count = entries.len(), "In-memory index loaded");
        Ok(Self::with_articles(entries))
    }

    pub async fn insert(&self, entry: IndexedArticle) {
        self.entries.write().await.push(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_articles(content: &str) -> Result<Vec<IndexedArticle>, IndexError> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content)
            .map_err(|e| IndexError::InvalidResponse(format!("invalid article file: {e}")));
    }

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<IndexedArticle>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping corrupted article entry");
                None
            }
        })
        .collect())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(&self, query: &VectorQuery) -> Result<Vec<RetrievedArticle>, IndexError> {
        let entries = self.entries.read().await;
        let items = entries
            .iter()
            .map(|e| (&e.article, e.embedding.as_slice()));

        Ok(rank_by_similarity(
            items,
            &query.vector,
            query.num_candidates,
            query.min_score,
            query.limit,
        ))
    }
}
