//! Turn classification: does the latest message continue the previous
//! exchange or start a new inquiry?

use std::sync::Arc;

use newsdesk_core::{ConversationTurn, Provider, ProviderRequest, Role, Stage, TurnError};
use tracing::{debug, warn};

use crate::policy::{Policy, PolicyTable};

/// Parsed classifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    FollowUp,
    NewTopic,
    /// Anything other than the two exact labels, kept for diagnostics.
    Unrecognized(String),
}

impl Classification {
    /// Accept only the literal labels, after trimming.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "followUp" => Self::FollowUp,
            "newTopic" => Self::NewTopic,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::FollowUp => "followUp",
            Self::NewTopic => "newTopic",
            Self::Unrecognized(raw) => raw,
        }
    }
}

/// The bounded slice of history the classifier sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationWindow {
    pub previous_user: String,
    pub previous_assistant: String,
    pub current_user: String,
}

impl ClassificationWindow {
    /// Walk backwards: the latest user turn, then the latest assistant turn
    /// before it, then the user turn before that.
    ///
    /// Without any assistant turn, the two latest user turns are used.
    pub fn from_history(history: &[ConversationTurn]) -> Self {
        let mut window = Self::default();
        let mut have_current = false;
        let mut have_assistant = false;

        for turn in history.iter().rev() {
            match turn.role {
                Role::User if !have_current => {
                    window.current_user = turn.content.clone();
                    have_current = true;
                }
                Role::Assistant if !have_assistant => {
                    window.previous_assistant = turn.content.clone();
                    have_assistant = true;
                }
                Role::User if have_assistant => {
                    window.previous_user = turn.content.clone();
                    break;
                }
                _ => {}
            }
        }

        if !have_assistant {
            window.previous_user = history
                .iter()
                .rev()
                .filter(|t| t.role == Role::User)
                .nth(1)
                .map(|t| t.content.clone())
                .unwrap_or_default();
        }

        window
    }

    pub fn render(&self) -> String {
        format!(
            "Conversation History:\nPrevious: {}\nAssistant: {}\nUser: {}\n\nClassify as:",
            self.previous_user, self.previous_assistant, self.current_user
        )
    }
}

pub struct TurnClassifier {
    provider: Arc<dyn Provider>,
    model: String,
    policies: Arc<PolicyTable>,
}

impl TurnClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, policies: Arc<PolicyTable>) -> Self {
        Self {
            provider,
            model: model.into(),
            policies,
        }
    }

    pub async fn classify(&self, history: &[ConversationTurn]) -> Result<Classification, TurnError> {
        match history.len() {
            0 => return Err(TurnError::EmptyHistory),
            1 => {
                debug!("Single-turn history, classifying as newTopic without a model call");
                return Ok(Classification::NewTopic);
            }
            _ => {}
        }

        let window = ClassificationWindow::from_history(history);
        let request = ProviderRequest::with_policy(
            &self.model,
            self.policies.get(Policy::Classification),
            &[ConversationTurn::user(window.render())],
        )
        .temperature(0.0)
        .max_tokens(10);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| TurnError::upstream(Stage::Classification, e))?;

        let classification = Classification::parse(&response.message.content);
        match &classification {
            Classification::Unrecognized(raw) => {
                warn!(raw = %raw, "Classifier returned an unrecognized label")
            }
            label => debug!(label = label.label(), "Turn classified"),
        }

        Ok(classification)
    }
}
