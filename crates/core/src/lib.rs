//! # NewsDesk Core
//!
//! Domain types, traits, and error definitions for the NewsDesk query router.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every upstream collaborator (completion service, embedding service, vector
//! index) is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod article;
pub mod envelope;
pub mod error;
pub mod index;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use article::RetrievedArticle;
pub use envelope::{EnvelopeReader, ProtocolEnvelope, Segment, Transcript};
pub use error::{IndexError, ProviderError, Result, RetrievalError, Stage, TurnError};
pub use index::{VectorIndex, VectorQuery};
pub use message::{ConversationTurn, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
