use serde::Deserialize;
use serde::Serialize;

/// A single rewritable field of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteField {
    Query,
    Reasoning,
    Answer,
}

impl RewriteField {
    pub fn as_str(self) -> &'static str {
        match self {
            RewriteField::Query => "query",
            RewriteField::Reasoning => "reasoning",
            RewriteField::Answer => "answer",
        }
    }
}

impl std::fmt::Display for RewriteField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which field(s) a rewrite call targets, and therefore how the raw model
/// output is decomposed.
///
/// The `Message*` variants address one turn of a multi-turn item and are only
/// used by the single-item actions; bulk runs operate on the item-level
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteTarget {
    Query,
    Reasoning,
    Answer,
    Both,
    MessageQuery,
    MessageReasoning,
    MessageAnswer,
    MessageBoth,
}

impl RewriteTarget {
    /// The concrete fields this target writes. `Both` expands to
    /// reasoning + answer.
    pub fn fields(self) -> &'static [RewriteField] {
        match self {
            RewriteTarget::Query | RewriteTarget::MessageQuery => &[RewriteField::Query],
            RewriteTarget::Reasoning | RewriteTarget::MessageReasoning => {
                &[RewriteField::Reasoning]
            }
            RewriteTarget::Answer | RewriteTarget::MessageAnswer => &[RewriteField::Answer],
            RewriteTarget::Both | RewriteTarget::MessageBoth => {
                &[RewriteField::Reasoning, RewriteField::Answer]
            }
        }
    }

    /// Field names as the backend job API expects them.
    pub fn backend_fields(self) -> Vec<String> {
        self.fields()
            .iter()
            .map(|f| f.as_str().to_string())
            .collect()
    }

    pub fn is_message_target(self) -> bool {
        matches!(
            self,
            RewriteTarget::MessageQuery
                | RewriteTarget::MessageReasoning
                | RewriteTarget::MessageAnswer
                | RewriteTarget::MessageBoth
        )
    }

    /// True when one call produces both reasoning and answer.
    pub fn is_combined(self) -> bool {
        matches!(self, RewriteTarget::Both | RewriteTarget::MessageBoth)
    }
}
