use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::str::FromStr;

use crate::rewrite::RewriteField;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct RoleParseError(String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// One turn of a multi-turn item.
///
/// Invariant: `reasoning_content` is attached only to assistant turns. The
/// constructors uphold it; deserialized messages are cleaned up via
/// [`ChatMessage::sanitized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            reasoning_content: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            reasoning_content: None,
        }
    }

    pub fn assistant_with_reasoning(
        content: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            reasoning_content: Some(reasoning.into()),
        }
    }

    /// Drops reasoning content from non-assistant turns.
    pub fn sanitized(mut self) -> Self {
        if self.role != Role::Assistant {
            self.reasoning_content = None;
        }
        self
    }
}

/// One training example under review.
///
/// Owned by the embedding layer's item collection; orchestrators read fields
/// and write back updated copies, they never mutate in place across an await.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub reasoning_content: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ChatMessage>,
    /// 0 = unrated, 1..=5 = rated.
    #[serde(default)]
    pub score: u8,
    #[serde(default)]
    pub has_unsaved_changes: bool,
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default)]
    pub is_discarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReviewItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: String::new(),
            reasoning: String::new(),
            reasoning_content: String::new(),
            answer: String::new(),
            messages: Vec::new(),
            score: 0,
            has_unsaved_changes: false,
            is_duplicate: false,
            is_discarded: false,
            session_uid: None,
            model_used: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_multi_turn(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn field(&self, field: RewriteField) -> &str {
        match field {
            RewriteField::Query => &self.query,
            RewriteField::Reasoning => &self.reasoning,
            RewriteField::Answer => &self.answer,
        }
    }

    /// Writes a field and flags the item dirty.
    pub fn set_field(&mut self, field: RewriteField, value: String) {
        match field {
            RewriteField::Query => self.query = value,
            RewriteField::Reasoning => self.reasoning = value,
            RewriteField::Answer => self.answer = value,
        }
        self.mark_dirty();
    }

    pub fn set_score(&mut self, score: u8) {
        self.score = score.min(5);
        self.mark_dirty();
    }

    pub fn mark_dirty(&mut self) {
        self.has_unsaved_changes = true;
        self.updated_at = Some(Utc::now());
    }
}
