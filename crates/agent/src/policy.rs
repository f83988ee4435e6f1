//! System policies sent ahead of every upstream completion.
//!
//! Each pipeline stage has exactly one policy. Two policies are templates:
//! the rewrite policy takes today's date and the fallback policy takes the
//! search query. [`PolicyTable::validate`] checks the table once, at
//! orchestrator construction.

use std::collections::HashMap;

use newsdesk_core::TurnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    Classification,
    Rewrite,
    FollowUp,
    Fallback,
    Title,
}

impl Policy {
    pub const ALL: [Policy; 5] = [
        Policy::Classification,
        Policy::Rewrite,
        Policy::FollowUp,
        Policy::Fallback,
        Policy::Title,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Rewrite => "rewrite",
            Self::FollowUp => "follow_up",
            Self::Fallback => "fallback",
            Self::Title => "title",
        }
    }

    /// Built-in policy text.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Classification => CLASSIFICATION_POLICY,
            Self::Rewrite => REWRITE_POLICY,
            Self::FollowUp => FOLLOW_UP_POLICY,
            Self::Fallback => FALLBACK_POLICY,
            Self::Title => TITLE_POLICY,
        }
    }

    /// Placeholder a templated policy must contain.
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            Self::Rewrite => Some(TODAY_PLACEHOLDER),
            Self::Fallback => Some(QUERY_PLACEHOLDER),
            _ => None,
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const TODAY_PLACEHOLDER: &str = "{today}";
pub const QUERY_PLACEHOLDER: &str = "{query}";

const CLASSIFICATION_POLICY: &str = r#"You classify the latest user message in a conversation about news.

Label it:
- followUp: it continues, narrows, compares against, or depends on the previous exchange.
- newTopic: it opens an unrelated subject and reads fine without any earlier context.

Signals for followUp: pronouns pointing back ("he", "it", "that"), continuation words ("also", "what about", "and"), clarifying or sequential questions ("the second largest?"), and anything in the same general domain as the previous exchange.
Signals for newTopic: a switch to a different domain, or a fully self-contained question.

Same domain means followUp. When any reasonable connection exists, choose followUp.

Answer with exactly one word, either followUp or newTopic, and nothing else."#;

const REWRITE_POLICY: &str = r#"You turn a user's question into a search query for a semantic vector index of news articles.

Today's date is {today}.

- Expand vague phrases into descriptive terms.
- Add closely related keywords where they help recall.
- Resolve pronouns and references using the conversation so far.
- Turn relative dates ("last year", "this week") into concrete dates or years.
- Keep the user's intent.

Examples:
"What's going on with Elon Musk and Twitter lately?" -> Elon Musk Twitter controversies
"when did the eagles win the last super bowl?" -> Philadelphia Eagles Super Bowl win

Reply with the query text only. No quotes, notes, or formatting."#;

const FOLLOW_UP_POLICY: &str = r#"You are a news assistant continuing a conversation. Answer the latest message concisely and accurately.

1. Use the conversation and any articles already shown when they answer the question.
2. Otherwise answer from what you know. Give your best direct answer even if your knowledge may be somewhat dated.
3. Say plainly that you lack the information only when you truly cannot answer, for example for events after your training data or requests for live figures.

Never announce that you will search or check something.

When the user asks for articles, or to filter or refine articles, reply with JSON only, in this shape:
{"type":"articles","results":[{"_id":"<string>","title":"<string>","link":"<string>","pubDate":"<ISO 8601>","content":"<string>","articleType":"<string>","score":<number>}],"note":"<short comment>"}

For every other question reply in plain natural language without markdown."#;

const FALLBACK_POLICY: &str = "You are a helpful news assistant. The user asked '{query}', but no relevant articles were found in the archive. Write a helpful, informative answer from what you know.";

const TITLE_POLICY: &str = "Generate a concise and descriptive title for the following user prompt (no longer than 4 words). Reply with the title only.";

/// The active policy texts, keyed by stage.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    texts: HashMap<Policy, String>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyTable {
    pub fn builtin() -> Self {
        Self {
            texts: Policy::ALL
                .iter()
                .map(|p| (*p, p.prompt().to_string()))
                .collect(),
        }
    }

    /// Replace one policy text. Call [`validate`](Self::validate) afterwards.
    pub fn with_override(mut self, policy: Policy, text: impl Into<String>) -> Self {
        self.texts.insert(policy, text.into());
        self
    }

    pub fn get(&self, policy: Policy) -> &str {
        self.texts
            .get(&policy)
            .map(String::as_str)
            .unwrap_or_else(|| policy.prompt())
    }

    /// Rewrite policy with today's date filled in.
    pub fn rewrite(&self, today: &str) -> String {
        self.get(Policy::Rewrite).replace(TODAY_PLACEHOLDER, today)
    }

    /// Fallback policy naming the query that found nothing.
    pub fn fallback(&self, query: &str) -> String {
        self.get(Policy::Fallback).replace(QUERY_PLACEHOLDER, query)
    }

    pub fn validate(&self) -> Result<(), TurnError> {
        for policy in Policy::ALL {
            let text = self
                .texts
                .get(&policy)
                .ok_or_else(|| TurnError::Policy(format!("missing {policy} policy")))?;

            if text.trim().is_empty() {
                return Err(TurnError::Policy(format!("{policy} policy is empty")));
            }

            if let Some(placeholder) = policy.placeholder() {
                if !text.contains(placeholder) {
                    return Err(TurnError::Policy(format!(
                        "{policy} policy must contain {placeholder}"
                    )));
                }
            }
        }
        Ok(())
    }
}
