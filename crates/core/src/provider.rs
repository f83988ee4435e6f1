//! Provider trait — the abstraction over model backends.
//!
//! A Provider knows how to send a conversation to a model and get a response
//! back, either as a complete message or as a stream of text deltas. It also
//! fronts the embedding service and the tool-augmented (live web search)
//! completion service, since in practice all three sit behind one API key.
//!
//! Implementations: OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::ConversationTurn;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The conversation messages, policy first
    pub messages: Vec<ConversationTurn>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// Build a request with a system policy followed by `history`.
    pub fn with_policy(
        model: impl Into<String>,
        policy: impl Into<String>,
        history: &[ConversationTurn],
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ConversationTurn::system(policy));
        messages.extend_from_slice(history);

        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            stream: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: ConversationTurn,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Receiving half of a streamed completion.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings (e.g., "text-embedding-ada-002").
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,

    /// Token usage.
    pub usage: Option<Usage>,
}

/// A tool-augmented completion request with live web lookup enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchRequest {
    /// The model to use (must support the web search tool).
    pub model: String,

    /// Flattened conversation context.
    pub input: String,
}

/// The finalized text of a tool-augmented completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchResponse {
    pub text: String,
    pub model: String,
}

/// The core Provider trait.
///
/// The pipeline calls `complete()`, `stream()`, `embed()` or `web_search()`
/// without knowing which backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(Ok(StreamChunk {
            content: Some(response.message.content),
            done: true,
            usage: response.usage,
        })).await;
        Ok(rx)
    }

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            format!("Provider '{}' does not support embeddings", self.name()),
        ))
    }

    /// Run a tool-augmented completion with live web search.
    async fn web_search(
        &self,
        _request: WebSearchRequest,
    ) -> std::result::Result<WebSearchResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            format!("Provider '{}' does not support web search", self.name()),
        ))
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Drain a streamed completion into one string.
///
/// Used where the whole answer must be inspected before anything is shown.
pub async fn collect_stream(mut rx: ChunkReceiver) -> std::result::Result<String, ProviderError> {
    let mut text = String::new();
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        if let Some(content) = chunk.content {
            text.push_str(&content);
        }
        if chunk.done {
            break;
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn request_builder_prepends_policy() {
        let history = vec![ConversationTurn::user("Who won?")];
        let req = ProviderRequest::with_policy("gpt-4o", "Be brief.", &history)
            .temperature(0.0)
            .max_tokens(10);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].content, "Who won?");
        assert_eq!(req.max_tokens, Some(10));
        assert!(req.temperature.abs() < f32::EPSILON);
        assert!(!req.stream);
    }

    #[test]
    fn request_defaults() {
        let req = ProviderRequest::with_policy("gpt-4o", "p", &[]).streaming();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.stream);
    }

    #[tokio::test]
    async fn collect_stream_joins_deltas() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        for piece in ["Elon ", "Musk ", "Twitter"] {
            tx.send(Ok(StreamChunk { content: Some(piece.into()), done: false, usage: None }))
                .await
                .unwrap();
        }
        tx.send(Ok(StreamChunk { content: None, done: true, usage: None }))
            .await
            .unwrap();
        drop(tx);

        let text = collect_stream(rx).await.unwrap();
        assert_eq!(text, "Elon Musk Twitter");
    }

    #[tokio::test]
    async fn collect_stream_propagates_interruption() {
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        tx.send(Ok(StreamChunk { content: Some("partial".into()), done: false, usage: None }))
            .await
            .unwrap();
        tx.send(Err(ProviderError::StreamInterrupted("eof".into())))
            .await
            .unwrap();
        drop(tx);

        assert!(matches!(
            collect_stream(rx).await,
            Err(ProviderError::StreamInterrupted(_))
        ));
    }
}
