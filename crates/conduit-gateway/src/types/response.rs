use serde::{Deserialize, Serialize};

use super::message::Message;

/// `object` value of a unary completion
pub const CHAT_COMPLETION_OBJECT: &str = "chat.completion";

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl Usage {
    /// Fold a later usage report into this one
    ///
    /// Streaming providers report counters cumulatively and sometimes
    /// split them across events, so each counter keeps its maximum.
    pub fn merge(&mut self, other: Self) {
        self.prompt_tokens = self.prompt_tokens.max(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.max(other.completion_tokens);
        self.total_tokens = self
            .total_tokens
            .max(other.total_tokens)
            .max(self.prompt_tokens.saturating_add(self.completion_tokens));
    }
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice
    pub index: u32,
    /// Generated message
    pub message: Message,
    /// Why generation stopped, as reported by the provider
    pub finish_reason: Option<String>,
}

/// Canonical chat-completion response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Unique response identifier
    pub id: String,
    /// Always `chat.completion`
    pub object: String,
    /// Unix timestamp of creation
    pub created: u64,
    /// Model that produced the response
    pub model: String,
    /// Generated choices
    pub choices: Vec<Choice>,
    /// Token usage statistics
    pub usage: Usage,
}
