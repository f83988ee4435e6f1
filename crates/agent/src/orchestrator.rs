//! The per-turn state machine.
//!
//! ```text
//! Classifying ─┬─ newTopic ─ Rewriting ─ Retrieving ─┬─ found ─ NarratingArticles ─┐
//!              │                                     └─ empty ─ NarratingFallback ─┤
//!              └─ followUp ─ Answering ─┬─ payload ──── NarratingArticles ─────────┤
//!                                       ├─ sufficient ─ StreamingAnswer ───────────┤
//!                                       └─ insufficient ─ NarratingFallback ───────┴─ Done
//! ```
//!
//! Transitions are one-shot. Every turn opens with the same narration and
//! ends after its last envelope. Failures are not retried; envelopes already
//! sent stay valid and the stream ends with the error.

use std::sync::Arc;
use std::time::Duration;

use newsdesk_config::{AppConfig, EmptyRetrievalMode, UnrecognizedPolicy};
use newsdesk_core::{
    ConversationTurn, ProtocolEnvelope, Provider, RetrievedArticle, Stage, TurnError, VectorIndex,
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::answer::DirectAnswerGenerator;
use crate::classifier::{Classification, TurnClassifier};
use crate::fallback::WebAugmentedFallback;
use crate::insufficiency::{is_insufficient, matched_phrase};
use crate::policy::PolicyTable;
use crate::retrieval::RetrievalEngine;
use crate::rewriter::QueryRewriter;
use crate::sink::{EnvelopeSink, Narrator, TurnStream};
use crate::tokens::TokenStreamer;

pub const ANALYZING: &str = "Analyzing your query...";
pub const FOUND_ARTICLES: &str = "Found relevant articles, Preparing articles...";
pub const PREPARING_ARTICLES: &str = "Preparing articles...";
pub const NO_ARTICLES: &str = "No relevant articles found. Generating a helpful summary instead...";
pub const NO_WEB_ANSWER: &str = "No answer could be found for this question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Classifying,
    Rewriting,
    Retrieving,
    NarratingArticles,
    NarratingFallback,
    Answering,
    StreamingAnswer,
    Done,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// An articles envelope was sent.
    Articles { count: usize },
    /// The direct follow-up answer was streamed.
    Answer,
    /// A fallback answer was streamed.
    Fallback,
    /// The classifier label matched no branch; only the opening narration was sent.
    Unclassified,
}

/// Summary of one completed turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub classification: Classification,
    pub outcome: TurnOutcome,
    /// States visited, in order, ending with `Done`.
    pub states: Vec<TurnState>,
    pub envelopes: Vec<ProtocolEnvelope>,
}

#[derive(Default)]
struct StateTrace {
    states: Vec<TurnState>,
}

impl StateTrace {
    fn enter(&mut self, state: TurnState) {
        debug!(?state, "Turn state");
        self.states.push(state);
    }
}

/// Routes one conversation turn through classification, retrieval or direct
/// answering, and escalation, writing envelopes as it goes.
#[derive(Clone)]
pub struct Orchestrator {
    classifier: Arc<TurnClassifier>,
    rewriter: Arc<QueryRewriter>,
    retrieval: Arc<RetrievalEngine>,
    answerer: Arc<DirectAnswerGenerator>,
    fallback: Arc<WebAugmentedFallback>,
    narrator: Narrator,
    article_delay: Duration,
    channel_capacity: usize,
    on_unrecognized: UnrecognizedPolicy,
    empty_retrieval: EmptyRetrievalMode,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        index: Arc<dyn VectorIndex>,
        config: &AppConfig,
    ) -> Result<Self, TurnError> {
        Self::with_policies(provider, index, config, PolicyTable::builtin())
    }

    /// Build with a custom policy table. The table is validated here.
    pub fn with_policies(
        provider: Arc<dyn Provider>,
        index: Arc<dyn VectorIndex>,
        config: &AppConfig,
        policies: PolicyTable,
    ) -> Result<Self, TurnError> {
        policies.validate()?;
        let policies = Arc::new(policies);
        let agent = &config.agent;

        let streamer = TokenStreamer::new(
            Duration::from_millis(config.pacing.token_delay_ms),
            config.pacing.channel_capacity,
        );

        Ok(Self {
            classifier: Arc::new(TurnClassifier::new(
                provider.clone(),
                &agent.classifier_model,
                policies.clone(),
            )),
            rewriter: Arc::new(QueryRewriter::new(
                provider.clone(),
                &agent.rewrite_model,
                policies.clone(),
            )),
            retrieval: Arc::new(RetrievalEngine::new(
                provider.clone(),
                index,
                &agent.embedding_model,
                config.retrieval.clone(),
            )),
            answerer: Arc::new(DirectAnswerGenerator::new(
                provider.clone(),
                &agent.answer_model,
                policies.clone(),
            )),
            fallback: Arc::new(WebAugmentedFallback::new(
                provider,
                &agent.search_model,
                &agent.fallback_model,
                config.fallback.context_turns,
                policies,
            )),
            narrator: Narrator::new(streamer),
            article_delay: Duration::from_millis(config.pacing.article_delay_ms),
            channel_capacity: config.pacing.channel_capacity,
            on_unrecognized: agent.on_unrecognized,
            empty_retrieval: config.fallback.empty_retrieval,
        })
    }

    /// Run a turn in the background and return its outward stream.
    ///
    /// A failed turn ends the stream with an `Err` item.
    pub fn run(&self, history: Vec<ConversationTurn>) -> TurnStream {
        let (mut sink, stream) = EnvelopeSink::channel(self.channel_capacity);
        let orchestrator = self.clone();

        tokio::spawn(async move {
            if let Err(err) = orchestrator.run_into(&history, &mut sink).await {
                if !matches!(err, TurnError::StreamClosed) {
                    sink.fail(err).await;
                }
            }
        });

        stream
    }

    /// Run a turn against a caller-owned sink.
    pub async fn run_into(
        &self,
        history: &[ConversationTurn],
        sink: &mut EnvelopeSink,
    ) -> Result<TurnReport, TurnError> {
        let turn_id = Uuid::new_v4();
        let span = info_span!("turn", %turn_id, turns = history.len());

        async move {
            let result = self.drive(turn_id, history, sink).await;
            match &result {
                Ok(report) => info!(
                    outcome = ?report.outcome,
                    envelopes = report.envelopes.len(),
                    "Turn complete"
                ),
                Err(TurnError::StreamClosed) => debug!("Receiver dropped, abandoning turn"),
                Err(e) => error!(error = %e, "Turn failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        turn_id: Uuid,
        history: &[ConversationTurn],
        sink: &mut EnvelopeSink,
    ) -> Result<TurnReport, TurnError> {
        if history.is_empty() {
            return Err(TurnError::EmptyHistory);
        }

        let mut trace = StateTrace::default();
        trace.enter(TurnState::Classifying);
        self.narrator.narrate(sink, ANALYZING).await?;

        let classification = self.classifier.classify(history).await?;
        let outcome = match &classification {
            Classification::NewTopic => self.new_topic(history, sink, &mut trace).await?,
            Classification::FollowUp => self.follow_up(history, sink, &mut trace).await?,
            Classification::Unrecognized(raw) => {
                self.unrecognized(raw, history, sink, &mut trace).await?
            }
        };

        trace.enter(TurnState::Done);
        Ok(TurnReport {
            turn_id,
            classification,
            outcome,
            states: trace.states,
            envelopes: sink.take_emitted(),
        })
    }

    async fn new_topic(
        &self,
        history: &[ConversationTurn],
        sink: &mut EnvelopeSink,
        trace: &mut StateTrace,
    ) -> Result<TurnOutcome, TurnError> {
        trace.enter(TurnState::Rewriting);
        let query = self.rewriter.rewrite(history).await?;

        trace.enter(TurnState::Retrieving);
        let articles = self.retrieval.retrieve(&query).await?;

        if !articles.is_empty() {
            trace.enter(TurnState::NarratingArticles);
            let count = articles.len();
            self.narrator.narrate(sink, FOUND_ARTICLES).await?;
            self.emit_articles(sink, articles, None).await?;
            return Ok(TurnOutcome::Articles { count });
        }

        trace.enter(TurnState::NarratingFallback);
        self.narrator.narrate(sink, NO_ARTICLES).await?;
        match self.empty_retrieval {
            EmptyRetrievalMode::ModelOnly => {
                let deltas = self.fallback.model_only(history, &query).await?;
                self.narrator
                    .forward_deltas(sink, deltas, Stage::Fallback)
                    .await?;
            }
            EmptyRetrievalMode::WebSearch => {
                self.search_and_stream(history, sink).await?;
            }
        }
        Ok(TurnOutcome::Fallback)
    }

    async fn follow_up(
        &self,
        history: &[ConversationTurn],
        sink: &mut EnvelopeSink,
        trace: &mut StateTrace,
    ) -> Result<TurnOutcome, TurnError> {
        trace.enter(TurnState::Answering);
        let answer = self.answerer.answer(history).await?;

        if let Some(payload) = answer.payload {
            trace.enter(TurnState::NarratingArticles);
            let count = payload.articles.len();
            self.narrator.narrate(sink, PREPARING_ARTICLES).await?;
            self.emit_articles(sink, payload.articles, payload.note)
                .await?;
            return Ok(TurnOutcome::Articles { count });
        }

        if !is_insufficient(&answer.narrative) {
            trace.enter(TurnState::StreamingAnswer);
            self.narrator.stream_text(sink, answer.narrative).await?;
            return Ok(TurnOutcome::Answer);
        }

        info!(
            chars = answer.narrative.chars().count(),
            phrase = matched_phrase(&answer.narrative),
            "Direct answer judged insufficient"
        );
        trace.enter(TurnState::NarratingFallback);
        self.search_and_stream(history, sink).await?;
        Ok(TurnOutcome::Fallback)
    }

    /// Web-search fallback, streamed. An empty result is narrated, not silent.
    async fn search_and_stream(
        &self,
        history: &[ConversationTurn],
        sink: &mut EnvelopeSink,
    ) -> Result<(), TurnError> {
        let text = self.fallback.search(history).await?;
        if text.is_empty() {
            warn!("Web search returned no text");
            return self.narrator.narrate(sink, NO_WEB_ANSWER).await;
        }
        self.narrator.stream_text(sink, text).await
    }

    async fn unrecognized(
        &self,
        raw: &str,
        history: &[ConversationTurn],
        sink: &mut EnvelopeSink,
        trace: &mut StateTrace,
    ) -> Result<TurnOutcome, TurnError> {
        match self.on_unrecognized {
            UnrecognizedPolicy::Error => Err(TurnError::Unclassified {
                raw: raw.to_string(),
            }),
            UnrecognizedPolicy::WebSearch if !raw.is_empty() => {
                trace.enter(TurnState::NarratingFallback);
                self.search_and_stream(history, sink).await?;
                Ok(TurnOutcome::Fallback)
            }
            _ => {
                warn!(raw, "No branch for classifier output, ending turn without an answer");
                Ok(TurnOutcome::Unclassified)
            }
        }
    }

    async fn emit_articles(
        &self,
        sink: &mut EnvelopeSink,
        articles: Vec<RetrievedArticle>,
        note: Option<String>,
    ) -> Result<(), TurnError> {
        if !self.article_delay.is_zero() {
            tokio::time::sleep(self.article_delay).await;
        }
        sink.emit(ProtocolEnvelope::Articles {
            results: articles,
            note,
        })
        .await
    }
}
