//! Last-resort answers: a live web lookup, or a model-only completion when
//! retrieval found nothing.

use std::sync::Arc;

use newsdesk_core::provider::{ChunkReceiver, WebSearchRequest};
use newsdesk_core::{ConversationTurn, Provider, ProviderRequest, Stage, TurnError};
use tracing::{debug, info};

use crate::policy::PolicyTable;

/// Flatten the last `turns` turns into `ROLE: content` lines.
pub fn flatten_context(history: &[ConversationTurn], turns: usize) -> String {
    let start = history.len().saturating_sub(turns.max(1));
    history[start..]
        .iter()
        .map(ConversationTurn::flatten)
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct WebAugmentedFallback {
    provider: Arc<dyn Provider>,
    search_model: String,
    fallback_model: String,
    context_turns: usize,
    policies: Arc<PolicyTable>,
}

impl WebAugmentedFallback {
    pub fn new(
        provider: Arc<dyn Provider>,
        search_model: impl Into<String>,
        fallback_model: impl Into<String>,
        context_turns: usize,
        policies: Arc<PolicyTable>,
    ) -> Self {
        Self {
            provider,
            search_model: search_model.into(),
            fallback_model: fallback_model.into(),
            context_turns,
            policies,
        }
    }

    /// One tool-augmented call with live lookup; returns the trimmed text.
    ///
    /// Never retried.
    pub async fn search(&self, history: &[ConversationTurn]) -> Result<String, TurnError> {
        let input = flatten_context(history, self.context_turns);
        info!(model = %self.search_model, "Escalating to web search");

        let response = self
            .provider
            .web_search(WebSearchRequest {
                model: self.search_model.clone(),
                input,
            })
            .await
            .map_err(|e| TurnError::upstream(Stage::Fallback, e))?;

        let text = response.text.trim().to_string();
        debug!(chars = text.chars().count(), "Web search answered");
        Ok(text)
    }

    /// Streamed completion under the fallback policy, naming the query that
    /// found no articles.
    pub async fn model_only(
        &self,
        history: &[ConversationTurn],
        query: &str,
    ) -> Result<ChunkReceiver, TurnError> {
        let request =
            ProviderRequest::with_policy(&self.fallback_model, self.policies.fallback(query), history)
                .streaming();

        self.provider
            .stream(request)
            .await
            .map_err(|e| TurnError::upstream(Stage::Fallback, e))
    }
}
