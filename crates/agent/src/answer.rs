//! Direct answers for follow-up turns.
//!
//! The follow-up completion is buffered whole, then split into free text and
//! embedded JSON objects. The first articles object becomes a structured
//! payload and echoed status objects contribute their text. Objects with some
//! other `type` are noise. Objects that do not parse, carry no `type`, or hold
//! articles that cannot be read stay in the narrative as ordinary text.

use std::sync::Arc;

use newsdesk_core::envelope::scan_segments;
use newsdesk_core::provider::collect_stream;
use newsdesk_core::{
    ConversationTurn, Provider, ProviderRequest, RetrievedArticle, Segment, Stage, TurnError,
};
use serde_json::Value;
use tracing::debug;

use crate::policy::{Policy, PolicyTable};

/// Articles the model chose to return instead of prose.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticlePayload {
    pub articles: Vec<RetrievedArticle>,
    pub note: Option<String>,
}

/// A follow-up answer after payload detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectAnswer {
    /// Remaining natural-language text, trimmed.
    pub narrative: String,
    pub payload: Option<ArticlePayload>,
}

// Our own narration echoed back by the model.
const ECHO_MARKERS: [&str; 2] = ["Analyzing", "query..."];

/// Split a buffered completion into narrative and an optional payload.
pub fn extract_answer(buffer: &str) -> DirectAnswer {
    let mut narrative = String::new();
    let mut payload = None;

    for segment in scan_segments(buffer) {
        let raw = match segment {
            Segment::Text(text) => {
                narrative.push_str(&text);
                continue;
            }
            Segment::Object(raw) => raw,
        };

        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            narrative.push_str(&raw);
            continue;
        };

        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("articles") if payload.is_none() => match parse_payload(value) {
                Some(found) => payload = Some(found),
                None => {
                    debug!("Keeping unreadable articles object as text");
                    narrative.push_str(&raw);
                }
            },
            Some("status") => {
                if let Some(text) = value.get("results").and_then(Value::as_str) {
                    if !ECHO_MARKERS.iter().any(|m| text.contains(m)) {
                        narrative.push_str(text);
                    }
                }
            }
            None => narrative.push_str(&raw),
            Some(kind) => debug!(kind, "Stripping embedded object"),
        }
    }

    DirectAnswer {
        narrative: narrative.trim().to_string(),
        payload,
    }
}

fn parse_payload(mut value: Value) -> Option<ArticlePayload> {
    let note = value.get("note").and_then(Value::as_str).map(String::from);
    let results = value.get_mut("results")?.take();
    let articles = serde_json::from_value(results).ok()?;
    Some(ArticlePayload { articles, note })
}

pub struct DirectAnswerGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    policies: Arc<PolicyTable>,
}

impl DirectAnswerGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, policies: Arc<PolicyTable>) -> Self {
        Self {
            provider,
            model: model.into(),
            policies,
        }
    }

    /// Stream the follow-up completion to its end and inspect it.
    pub async fn answer(&self, history: &[ConversationTurn]) -> Result<DirectAnswer, TurnError> {
        let request =
            ProviderRequest::with_policy(&self.model, self.policies.get(Policy::FollowUp), history)
                .streaming();

        let deltas = self
            .provider
            .stream(request)
            .await
            .map_err(|e| TurnError::upstream(Stage::Answer, e))?;
        let buffer = collect_stream(deltas)
            .await
            .map_err(|e| TurnError::upstream(Stage::Answer, e))?;

        let answer = extract_answer(&buffer);
        debug!(
            chars = answer.narrative.chars().count(),
            payload = answer.payload.is_some(),
            "Follow-up answer buffered"
        );
        Ok(answer)
    }
}
