use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use crate::error::GatewayError;

/// Sampling parameters accepted on the canonical request
///
/// Each provider forwards the subset it supports under its own names and
/// omits the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Number of choices to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
    /// Presence penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Frequency penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// End-user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// `stop` may be a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    /// All stop sequences as a list
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(stop) => vec![stop.clone()],
            Self::Many(stops) => stops.clone(),
        }
    }
}

/// Canonical chat-completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Requested model name
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
    /// Generation parameters
    #[serde(flatten)]
    pub params: SamplingParams,
}

impl CompletionRequest {
    /// Build a request with default sampling parameters
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            params: SamplingParams::default(),
        }
    }

    /// Check the invariants every provider relies on
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::Validation("`model` must not be empty".to_owned()));
        }

        if self.messages.is_empty() {
            return Err(GatewayError::Validation("`messages` must not be empty".to_owned()));
        }

        if self.params.n == Some(0) {
            return Err(GatewayError::Validation("`n` must be at least 1".to_owned()));
        }

        if self.messages.iter().all(|m| m.role == Role::System) {
            return Err(GatewayError::Validation(
                "`messages` must contain at least one user or assistant message".to_owned(),
            ));
        }

        Ok(())
    }
}
