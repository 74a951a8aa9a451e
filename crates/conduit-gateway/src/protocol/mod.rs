//! Wire-format types for each upstream provider API

pub mod anthropic;
pub mod google;
pub mod openai;

use serde::Serialize;

/// Provider-specific request body ready to be sent upstream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireBody {
    /// `OpenAI` chat completions body
    OpenAi(openai::OpenAiRequest),
    /// Anthropic messages body
    Anthropic(anthropic::AnthropicRequest),
    /// Google `generateContent` body
    Google(google::GoogleRequest),
}

/// Translated request plus the routing facts the dispatcher needs
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    /// Model name as the provider expects it
    pub model: String,
    /// Whether the upstream call streams
    pub stream: bool,
    /// Serialized body
    pub body: WireBody,
}
