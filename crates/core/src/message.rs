//! Conversation turn domain types.
//!
//! The caller supplies an ordered, chronological slice of turns for every
//! request. The core never mutates or stores it.

use serde::{Deserialize, Serialize};

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant (a previous answer of this system)
    Assistant,
    /// Policy instructions; only ever sent upstream, never accepted from callers
    System,
}

impl Role {
    /// Lowercase wire name (`"user"`, `"assistant"`, `"system"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who wrote this turn
    pub role: Role,

    /// The text content
    pub content: String,
}

impl ConversationTurn {
    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a system (policy) turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Render as a `ROLE: content` line.
    pub fn flatten(&self) -> String {
        format!("{}: {}", self.role.as_str().to_uppercase(), self.content)
    }
}

/// The most recent user turn in a history, if any.
pub fn latest_user_turn(history: &[ConversationTurn]) -> Option<&ConversationTurn> {
    history.iter().rev().find(|t| t.role == Role::User)
}
