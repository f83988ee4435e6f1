//! Query rewriting for the new-topic branch.

use std::sync::Arc;

use newsdesk_core::message::latest_user_turn;
use newsdesk_core::provider::collect_stream;
use newsdesk_core::{ConversationTurn, Provider, ProviderRequest, Stage, TurnError};
use tracing::{debug, warn};

use crate::policy::PolicyTable;

/// Turns the conversation into one search-optimized query string.
///
/// The completion is streamed but fully collected here; none of it reaches
/// the caller.
pub struct QueryRewriter {
    provider: Arc<dyn Provider>,
    model: String,
    policies: Arc<PolicyTable>,
    today: Option<String>,
}

impl QueryRewriter {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, policies: Arc<PolicyTable>) -> Self {
        Self {
            provider,
            model: model.into(),
            policies,
            today: None,
        }
    }

    /// Pin the date given to the rewrite policy.
    pub fn with_today(mut self, today: impl Into<String>) -> Self {
        self.today = Some(today.into());
        self
    }

    fn today(&self) -> String {
        self.today
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string())
    }

    pub async fn rewrite(&self, history: &[ConversationTurn]) -> Result<String, TurnError> {
        let request =
            ProviderRequest::with_policy(&self.model, self.policies.rewrite(&self.today()), history)
                .streaming();

        let deltas = self
            .provider
            .stream(request)
            .await
            .map_err(|e| TurnError::upstream(Stage::Rewrite, e))?;
        let collected = collect_stream(deltas)
            .await
            .map_err(|e| TurnError::upstream(Stage::Rewrite, e))?;

        let query = collected.trim();
        if !query.is_empty() {
            debug!(query = %query, "Rewrote query");
            return Ok(query.to_string());
        }

        let original = latest_user_turn(history)
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();
        warn!(fallback = %original, "Rewrite came back empty, searching with the user's words");
        Ok(original)
    }
}
