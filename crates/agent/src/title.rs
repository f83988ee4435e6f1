//! Short conversation titles from the first user prompt.

use std::sync::Arc;

use newsdesk_core::{ConversationTurn, Provider, ProviderRequest, Stage, TurnError};
use tracing::debug;

use crate::policy::{Policy, PolicyTable};

pub const DEFAULT_TITLE: &str = "Untitled Conversation";

pub struct TitleGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    policies: Arc<PolicyTable>,
}

impl TitleGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, policies: Arc<PolicyTable>) -> Self {
        Self {
            provider,
            model: model.into(),
            policies,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, TurnError> {
        let request = ProviderRequest::with_policy(
            &self.model,
            self.policies.get(Policy::Title),
            &[ConversationTurn::user(prompt)],
        );

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| TurnError::upstream(Stage::Title, e))?;

        let title = response.message.content.trim();
        if title.is_empty() {
            return Ok(DEFAULT_TITLE.to_string());
        }
        debug!(title, "Generated conversation title");
        Ok(title.to_string())
    }
}
