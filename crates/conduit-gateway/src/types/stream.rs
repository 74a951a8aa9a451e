use serde::{Deserialize, Serialize};

use super::message::Role;

/// `object` value of a stream chunk
pub const CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";

/// Identity shared by every chunk of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamContext {
    /// Response identifier
    pub id: String,
    /// Unix timestamp of the stream start
    pub created: u64,
    /// Requested model
    pub model: String,
}

/// Incremental role/content update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Role, usually only on the first chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Content fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Delta {
    /// Whether the delta carries neither role nor content
    pub const fn is_empty(&self) -> bool {
        self.role.is_none() && self.content.is_none()
    }
}

/// Delta for a single choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChoice {
    /// Choice index
    pub index: u32,
    /// Incremental update
    pub delta: Delta,
    /// Finish reason, present only on the provider's final delta
    pub finish_reason: Option<String>,
}

impl StreamChoice {
    /// Whether the choice has anything worth emitting
    pub const fn carries_update(&self) -> bool {
        !self.delta.is_empty() || self.finish_reason.is_some()
    }
}

/// One canonical stream chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Response identifier
    pub id: String,
    /// Always `chat.completion.chunk`
    pub object: String,
    /// Unix timestamp of the stream start
    pub created: u64,
    /// Model producing the stream
    pub model: String,
    /// Per-choice deltas
    pub choices: Vec<StreamChoice>,
}

impl StreamChunk {
    /// Build a chunk from choices, or `None` if no choice carries an update
    pub fn from_choices(context: &StreamContext, choices: Vec<StreamChoice>) -> Option<Self> {
        let choices: Vec<_> = choices.into_iter().filter(StreamChoice::carries_update).collect();
        if choices.is_empty() {
            return None;
        }

        Some(Self {
            id: context.id.clone(),
            object: CHAT_COMPLETION_CHUNK_OBJECT.to_owned(),
            created: context.created,
            model: context.model.clone(),
            choices,
        })
    }

    /// Delta of the first choice
    pub fn delta(&self) -> Option<&Delta> {
        self.choices.first().map(|c| &c.delta)
    }

    /// Finish reason of the first choice
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}
