//! Error types for the NewsDesk domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `TurnError` is the only
//! error that crosses the orchestrator boundary.

use thiserror::Error;

/// Result type alias using the turn-level error.
pub type Result<T> = std::result::Result<T, TurnError>;

/// The pipeline stage an upstream failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classification,
    Rewrite,
    Embedding,
    Search,
    Answer,
    Fallback,
    Title,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Classification => "classification",
            Self::Rewrite => "rewrite",
            Self::Embedding => "embedding",
            Self::Search => "vector search",
            Self::Answer => "answer",
            Self::Fallback => "fallback",
            Self::Title => "title",
        };
        f.write_str(name)
    }
}

/// The error surfaced to the caller of a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Conversation history is empty")]
    EmptyHistory,

    /// Any network / model / embedding / index failure, wrapped generically.
    #[error("Failed to generate content during {stage}: {message}")]
    Upstream { stage: Stage, message: String },

    #[error("Classifier returned an unrecognized label: {raw:?}")]
    Unclassified { raw: String },

    #[error("Invalid policy table: {0}")]
    Policy(String),

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Outward stream closed by the receiver")]
    StreamClosed,
}

impl TurnError {
    /// Wrap an upstream failure with the stage it happened in.
    pub fn upstream(stage: Stage, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            stage,
            message: err.to_string(),
        }
    }
}

impl From<RetrievalError> for TurnError {
    fn from(err: RetrievalError) -> Self {
        Self::upstream(err.stage(), err)
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("Vector index request failed: {0}")]
    Request(String),

    #[error("Invalid vector index response: {0}")]
    InvalidResponse(String),

    #[error("Vector index not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("Vector search failed: {0}")]
    Index(#[from] IndexError),

    #[error("Embedding service returned no vector")]
    EmptyEmbedding,

    #[error("Embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl RetrievalError {
    /// The pipeline stage this failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Index(_) => Stage::Search,
            _ => Stage::Embedding,
        }
    }
}
