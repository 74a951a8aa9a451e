//! Google Gemini adapter

use conduit_config::ProviderConfig;
use serde_json::Value;
use url::Url;

use super::{
    ProviderAdapter, SystemPrompt, completion_id, decode_body, decode_event, join_url, partition_system, unix_now,
};
use crate::error::GatewayError;
use crate::protocol::google::{GoogleContent, GoogleGenerationConfig, GoogleRequest, GoogleResponse};
use crate::protocol::{WireBody, WireRequest};
use crate::sse::SseEvent;
use crate::types::{
    CHAT_COMPLETION_OBJECT, Choice, CompletionRequest, CompletionResponse, Delta, Message, Role, StreamChoice,
    StreamChunk, StreamContext, Usage,
};
use crate::usage::UsageKeys;

/// Protocol name in configuration
pub const PROTOCOL: &str = "google";

/// Adapter for the Gemini `generateContent` API
pub struct GoogleAdapter {
    name: String,
    base_url: Url,
    usage: UsageKeys,
}

impl GoogleAdapter {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            usage: default_usage_keys().with_overrides(config.usage.as_ref()),
        }
    }
}

/// Default usage location in Gemini payloads
pub fn default_usage_keys() -> UsageKeys {
    UsageKeys::new("usageMetadata", "promptTokenCount", "candidatesTokenCount", Some("totalTokenCount"))
}

/// Gemini calls the assistant "model"
fn wire_role(role: &Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        _ => "user",
    }
}

impl ProviderAdapter for GoogleAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn system_prompt(&self) -> SystemPrompt {
        SystemPrompt::Extracted
    }

    fn endpoint(&self, model: &str, stream: bool) -> Result<Url, GatewayError> {
        let path = if stream {
            format!("models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("models/{model}:generateContent")
        };
        join_url(&self.base_url, &path)
    }

    fn translate(&self, request: &CompletionRequest) -> Result<WireRequest, GatewayError> {
        let partitioned = partition_system(&request.messages)?;
        let params = &request.params;

        let contents = partitioned
            .conversation()
            .map(|message| GoogleContent::text(Some(wire_role(&message.role)), message.content.clone()))
            .collect();

        let generation_config = GoogleGenerationConfig {
            temperature: params.temperature,
            top_p: params.top_p,
            candidate_count: params.n,
            max_output_tokens: params.max_tokens,
            stop_sequences: params.stop.as_ref().map(|stop| stop.to_vec()),
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
        };

        let body = GoogleRequest {
            contents,
            system_instruction: partitioned.system_text().map(|text| GoogleContent::text(None, text)),
            generation_config: (!generation_config.is_empty()).then_some(generation_config),
        };

        Ok(WireRequest {
            model: request.model.clone(),
            stream: request.stream,
            body: WireBody::Google(body),
        })
    }

    fn normalize_unary(&self, body: &Value, requested_model: &str) -> Result<CompletionResponse, GatewayError> {
        let response: GoogleResponse = decode_body(&self.name, body)?;

        let choices = response
            .candidates
            .iter()
            .zip(0u32..)
            .map(|(candidate, position)| Choice {
                index: candidate.index.unwrap_or(position),
                message: Message::assistant(
                    candidate
                        .content
                        .as_ref()
                        .map(GoogleContent::joined_text)
                        .unwrap_or_default(),
                ),
                finish_reason: Some(candidate.finish_reason.clone().unwrap_or_else(|| "stop".to_owned())),
            })
            .collect();

        Ok(CompletionResponse {
            id: response.response_id.unwrap_or_else(completion_id),
            object: CHAT_COMPLETION_OBJECT.to_owned(),
            created: unix_now(),
            model: response.model_version.unwrap_or_else(|| requested_model.to_owned()),
            choices,
            usage: self.usage.extract(body).unwrap_or_default(),
        })
    }

    fn normalize_chunk(&self, event: &SseEvent, context: &StreamContext) -> Result<Option<StreamChunk>, GatewayError> {
        let Some(response) = decode_event::<GoogleResponse>(event)? else {
            return Ok(None);
        };

        let choices = response
            .candidates
            .into_iter()
            .zip(0u32..)
            .map(|(candidate, position)| {
                let text = candidate.content.as_ref().map(GoogleContent::joined_text);
                StreamChoice {
                    index: candidate.index.unwrap_or(position),
                    delta: Delta {
                        role: None,
                        content: text.filter(|text| !text.is_empty()),
                    },
                    finish_reason: candidate.finish_reason,
                }
            })
            .collect();

        Ok(StreamChunk::from_choices(context, choices))
    }

    fn stream_usage(&self, event: &SseEvent) -> Option<Usage> {
        event.json().and_then(|json| self.usage.extract(json))
    }
}
