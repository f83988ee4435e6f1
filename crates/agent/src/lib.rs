//! The per-turn query routing pipeline.
//!
//! For each user turn the pipeline:
//!
//! 1. **Classifies** the turn as a follow-up or a new topic
//! 2. **New topic**: rewrites the query, embeds it, and searches the vector
//!    index; found articles are sent as one structured envelope
//! 3. **Follow-up**: answers directly, detecting an embedded articles payload
//! 4. **Escalates** to a web-augmented fallback when retrieval is empty or
//!    the direct answer looks too weak
//!
//! Everything the caller sees is a stream of concatenated JSON envelopes,
//! narration first, paced token by token.

pub mod answer;
pub mod classifier;
pub mod fallback;
pub mod insufficiency;
pub mod orchestrator;
pub mod policy;
pub mod retrieval;
pub mod rewriter;
pub mod sink;
pub mod title;
pub mod tokens;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use answer::{ArticlePayload, DirectAnswer, DirectAnswerGenerator};
pub use classifier::{Classification, ClassificationWindow, TurnClassifier};
pub use fallback::WebAugmentedFallback;
pub use insufficiency::is_insufficient;
pub use orchestrator::{Orchestrator, TurnOutcome, TurnReport, TurnState};
pub use policy::{Policy, PolicyTable};
pub use retrieval::RetrievalEngine;
pub use rewriter::QueryRewriter;
pub use sink::{DrainedTurn, EnvelopeSink, Narrator, TurnItem, TurnStream};
pub use title::TitleGenerator;
pub use tokens::{tokenize, TokenStreamer};
