//! Shared test helpers for pipeline tests.

use newsdesk_core::error::{IndexError, ProviderError};
use newsdesk_core::message::ConversationTurn;
use newsdesk_core::provider::{
    ChunkReceiver, EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest,
    ProviderResponse, StreamChunk, Usage, WebSearchRequest, WebSearchResponse,
};
use newsdesk_core::{RetrievedArticle, VectorIndex, VectorQuery};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock provider that replays scripted replies in order.
///
/// Completions (`complete` and `stream`) share one queue; embeddings and
/// web searches have their own. Every request is recorded. Panics if more
/// calls are made than replies provided.
#[derive(Default)]
pub struct SequentialMockProvider {
    completions: Mutex<VecDeque<Result<String, ProviderError>>>,
    embeddings: Mutex<VecDeque<Result<Vec<f32>, ProviderError>>>,
    searches: Mutex<VecDeque<Result<String, ProviderError>>>,
    pub requests: Mutex<Vec<ProviderRequest>>,
    pub embed_requests: Mutex<Vec<EmbeddingRequest>>,
    pub search_requests: Mutex<Vec<WebSearchRequest>>,
}

impl SequentialMockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completions(texts: &[&str]) -> Self {
        let provider = Self::new();
        for text in texts {
            provider.push_completion(text);
        }
        provider
    }

    pub fn push_completion(&self, text: &str) {
        self.completions
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    pub fn push_completion_error(&self, err: ProviderError) {
        self.completions.lock().unwrap().push_back(Err(err));
    }

    pub fn push_embedding(&self, vector: Vec<f32>) {
        self.embeddings.lock().unwrap().push_back(Ok(vector));
    }

    pub fn push_embedding_error(&self, err: ProviderError) {
        self.embeddings.lock().unwrap().push_back(Err(err));
    }

    pub fn push_search(&self, text: &str) {
        self.searches.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_search_error(&self, err: ProviderError) {
        self.searches.lock().unwrap().push_back(Err(err));
    }

    /// Completion + stream calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn search_count(&self) -> usize {
        self.search_requests.lock().unwrap().len()
    }

    fn next_completion(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        self.completions.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!(
                "SequentialMockProvider: no more completions (call #{})",
                requests.len()
            )
        })
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let text = self.next_completion(request)?;
        Ok(make_text_response(&text))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let text = self.next_completion(request)?;
        Ok(chunked_stream(&text, 7))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        let model = request.model.clone();
        self.embed_requests.lock().unwrap().push(request);
        let vector = self
            .embeddings
            .lock()
            .unwrap()
            .pop_front()
            .expect("SequentialMockProvider: no more embeddings")?;
        Ok(EmbeddingResponse {
            embeddings: vec![vector],
            model,
            usage: None,
        })
    }

    async fn web_search(
        &self,
        request: WebSearchRequest,
    ) -> Result<WebSearchResponse, ProviderError> {
        let model = request.model.clone();
        self.search_requests.lock().unwrap().push(request);
        let text = self
            .searches
            .lock()
            .unwrap()
            .pop_front()
            .expect("SequentialMockProvider: no more web searches")?;
        Ok(WebSearchResponse { text, model })
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: ConversationTurn::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Split `text` into deltas of at most `size` characters, then a done chunk.
pub fn chunked_stream(text: &str, size: usize) -> ChunkReceiver {
    let chars: Vec<char> = text.chars().collect();
    let pieces: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();
    let (tx, rx) = tokio::sync::mpsc::channel(pieces.len() + 1);
    for piece in pieces {
        tx.try_send(Ok(StreamChunk {
            content: Some(piece),
            done: false,
            usage: None,
        }))
        .unwrap();
    }
    tx.try_send(Ok(StreamChunk {
        content: None,
        done: true,
        usage: None,
    }))
    .unwrap();
    rx
}

/// An index that returns a fixed result set and records queries.
#[derive(Default)]
pub struct ScriptedIndex {
    results: Vec<RetrievedArticle>,
    failure: Option<IndexError>,
    pub queries: Mutex<Vec<VectorQuery>>,
}

impl ScriptedIndex {
    pub fn returning(results: Vec<RetrievedArticle>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    pub fn failing(err: IndexError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl VectorIndex for ScriptedIndex {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, query: &VectorQuery) -> Result<Vec<RetrievedArticle>, IndexError> {
        self.queries.lock().unwrap().push(query.clone());
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.results.clone()),
        }
    }
}

pub fn article(id: &str, score: f32) -> RetrievedArticle {
    RetrievedArticle {
        id: id.into(),
        title: format!("Article {id}"),
        link: format!("https://news.example.com/{id}"),
        content: format!("Body of {id}"),
        article_type: "Politics".into(),
        publish_date: "2025-01-05T00:00:00Z".into(),
        score,
    }
}
