//! `OpenAI`-compatible chat completions adapter

use conduit_config::ProviderConfig;
use serde_json::Value;
use url::Url;

use super::{
    ProviderAdapter, SystemPrompt, completion_id, decode_body, decode_event, join_url, partition_system, unix_now,
};
use crate::error::GatewayError;
use crate::protocol::openai::{OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions};
use crate::protocol::{WireBody, WireRequest};
use crate::sse::SseEvent;
use crate::types::{
    CHAT_COMPLETION_OBJECT, Choice, CompletionRequest, CompletionResponse, Delta, Message, Role, StreamChoice,
    StreamChunk, StreamContext, Usage,
};
use crate::usage::UsageKeys;

/// Protocol name in configuration
pub const PROTOCOL: &str = "openai";

/// Adapter for `OpenAI` and compatible servers
pub struct OpenAiAdapter {
    name: String,
    base_url: Url,
    usage: UsageKeys,
    stream_usage: bool,
}

impl OpenAiAdapter {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            usage: default_usage_keys().with_overrides(config.usage.as_ref()),
            stream_usage: is_canonical_openai(&config.base_url),
        }
    }
}

/// Default usage location in `OpenAI` payloads
pub fn default_usage_keys() -> UsageKeys {
    UsageKeys::new("usage", "prompt_tokens", "completion_tokens", Some("total_tokens"))
}

/// Whether the base URL is the canonical `OpenAI` API
///
/// Only the canonical API is sent `stream_options`; several compatible
/// servers reject the unknown parameter.
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

impl From<&Message> for OpenAiMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_owned(),
            content: Some(message.content.clone()),
            name: message.name.clone(),
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn system_prompt(&self) -> SystemPrompt {
        SystemPrompt::Inline
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> Result<Url, GatewayError> {
        join_url(&self.base_url, "chat/completions")
    }

    fn translate(&self, request: &CompletionRequest) -> Result<WireRequest, GatewayError> {
        let partitioned = partition_system(&request.messages)?;
        let params = &request.params;

        let body = OpenAiRequest {
            model: request.model.clone(),
            messages: partitioned.inline().into_iter().map(OpenAiMessage::from).collect(),
            temperature: params.temperature,
            top_p: params.top_p,
            n: params.n,
            max_tokens: params.max_tokens,
            stop: params.stop.as_ref().map(|stop| stop.to_vec()),
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
            user: params.user.clone(),
            stream: request.stream,
            stream_options: (request.stream && self.stream_usage).then_some(OpenAiStreamOptions { include_usage: true }),
        };

        Ok(WireRequest {
            model: request.model.clone(),
            stream: request.stream,
            body: WireBody::OpenAi(body),
        })
    }

    fn normalize_unary(&self, body: &Value, requested_model: &str) -> Result<CompletionResponse, GatewayError> {
        let response: OpenAiResponse = decode_body(&self.name, body)?;

        let choices = response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: Role::from(choice.message.role),
                    content: choice.message.content.unwrap_or_default(),
                    name: choice.message.name,
                },
                finish_reason: Some(choice.finish_reason.unwrap_or_else(|| "stop".to_owned())),
            })
            .collect();

        Ok(CompletionResponse {
            id: response.id.unwrap_or_else(completion_id),
            object: CHAT_COMPLETION_OBJECT.to_owned(),
            created: response.created.unwrap_or_else(unix_now),
            model: response.model.unwrap_or_else(|| requested_model.to_owned()),
            choices,
            usage: self.usage.extract(body).unwrap_or_default(),
        })
    }

    fn normalize_chunk(&self, event: &SseEvent, context: &StreamContext) -> Result<Option<StreamChunk>, GatewayError> {
        let Some(chunk) = decode_event::<OpenAiStreamChunk>(event)? else {
            return Ok(None);
        };

        let choices = chunk
            .choices
            .into_iter()
            .map(|choice| StreamChoice {
                index: choice.index,
                delta: Delta {
                    role: choice.delta.role.map(Role::from),
                    content: choice.delta.content,
                },
                finish_reason: choice.finish_reason,
            })
            .collect();

        Ok(StreamChunk::from_choices(context, choices))
    }

    fn stream_usage(&self, event: &SseEvent) -> Option<Usage> {
        event.json().and_then(|json| self.usage.extract(json))
    }
}
