//! Anthropic Messages API adapter

use conduit_config::ProviderConfig;
use serde_json::Value;
use url::Url;

use super::{
    ProviderAdapter, SystemPrompt, completion_id, decode_body, decode_event, join_url, partition_system, unix_now,
};
use crate::error::GatewayError;
use crate::protocol::anthropic::{
    AnthropicBlockDelta, AnthropicContentBlock, AnthropicMessage, AnthropicMetadata, AnthropicRequest,
    AnthropicResponse, AnthropicStreamEvent,
};
use crate::protocol::{WireBody, WireRequest};
use crate::sse::SseEvent;
use crate::types::{
    CHAT_COMPLETION_OBJECT, Choice, CompletionRequest, CompletionResponse, Delta, Message, Role, StreamChoice,
    StreamChunk, StreamContext, Usage,
};
use crate::usage::UsageKeys;

/// Protocol name in configuration
pub const PROTOCOL: &str = "anthropic";

/// Default max tokens when not specified (Anthropic requires this field)
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// API version sent unless the provider configures its own
const API_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic Messages API
pub struct AnthropicAdapter {
    name: String,
    base_url: Url,
    usage: UsageKeys,
}

impl AnthropicAdapter {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            usage: default_usage_keys().with_overrides(config.usage.as_ref()),
        }
    }
}

/// Default usage location in Anthropic payloads
pub fn default_usage_keys() -> UsageKeys {
    UsageKeys::new("usage", "input_tokens", "output_tokens", None)
}

impl ProviderAdapter for AnthropicAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn system_prompt(&self) -> SystemPrompt {
        SystemPrompt::Extracted
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> Result<Url, GatewayError> {
        join_url(&self.base_url, "messages")
    }

    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("anthropic-version", API_VERSION)]
    }

    fn translate(&self, request: &CompletionRequest) -> Result<WireRequest, GatewayError> {
        let partitioned = partition_system(&request.messages)?;
        let params = &request.params;

        let messages = partitioned
            .conversation()
            .map(|message| AnthropicMessage {
                role: message.role.as_str().to_owned(),
                content: message.content.clone(),
            })
            .collect();

        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: partitioned.system_text().map(str::to_owned),
            messages,
            temperature: params.temperature,
            top_p: params.top_p,
            stop_sequences: params.stop.as_ref().map(|stop| stop.to_vec()),
            stream: request.stream.then_some(true),
            metadata: params.user.clone().map(|user_id| AnthropicMetadata { user_id }),
        };

        Ok(WireRequest {
            model: request.model.clone(),
            stream: request.stream,
            body: WireBody::Anthropic(body),
        })
    }

    fn normalize_unary(&self, body: &Value, requested_model: &str) -> Result<CompletionResponse, GatewayError> {
        let response: AnthropicResponse = decode_body(&self.name, body)?;

        let content: String = response
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                AnthropicContentBlock::Other => None,
            })
            .collect();

        Ok(CompletionResponse {
            id: response.id.unwrap_or_else(completion_id),
            object: CHAT_COMPLETION_OBJECT.to_owned(),
            created: unix_now(),
            model: response.model.unwrap_or_else(|| requested_model.to_owned()),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: Some(response.stop_reason.unwrap_or_else(|| "stop".to_owned())),
            }],
            usage: self.usage.extract(body).unwrap_or_default(),
        })
    }

    fn normalize_chunk(&self, event: &SseEvent, context: &StreamContext) -> Result<Option<StreamChunk>, GatewayError> {
        let Some(event) = decode_event::<AnthropicStreamEvent>(event)? else {
            return Ok(None);
        };

        let (delta, finish_reason) = match event {
            AnthropicStreamEvent::MessageStart { message } => (
                Delta {
                    role: Some(message.role.map_or(Role::Assistant, Role::from)),
                    content: None,
                },
                None,
            ),
            AnthropicStreamEvent::ContentBlockDelta {
                delta: AnthropicBlockDelta::TextDelta { text },
                ..
            } => (
                Delta {
                    role: None,
                    content: Some(text),
                },
                None,
            ),
            AnthropicStreamEvent::MessageDelta { delta } => (Delta::default(), delta.stop_reason),
            AnthropicStreamEvent::Error { error } => {
                return Err(GatewayError::StreamParse(format!(
                    "provider reported {}: {}",
                    error.error_type.as_deref().unwrap_or("error"),
                    error.message
                )));
            }
            AnthropicStreamEvent::ContentBlockDelta { .. }
            | AnthropicStreamEvent::ContentBlockStart { .. }
            | AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::MessageStop
            | AnthropicStreamEvent::Ping => return Ok(None),
        };

        Ok(StreamChunk::from_choices(
            context,
            vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        ))
    }

    fn stream_usage(&self, event: &SseEvent) -> Option<Usage> {
        let json = event.json()?;

        // `message_start` nests usage under `message`, `message_delta` does not
        self.usage
            .extract(json)
            .or_else(|| json.get("message").and_then(|message| self.usage.extract(message)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sse::SseData;
    use crate::types::{SamplingParams, StopSequences};

    fn adapter() -> AnthropicAdapter {
        let config: ProviderConfig = toml::from_str(
            r#"
            name = "anthropic"
            base_url = "https://api.anthropic.com/v1"
            auth_type = "header"
            key_env = "ANTHROPIC_API_KEY"
            "#,
        )
        .unwrap();
        AnthropicAdapter::new(&config)
    }

    fn event(data: Value) -> SseEvent {
        SseEvent {
            event_type: data["type"].as_str().map(str::to_owned),
            data: SseData::Json(data),
        }
    }

    fn context() -> StreamContext {
        StreamContext {
            id: "chatcmpl-test".to_owned(),
            created: 1,
            model: "claude-3-5-sonnet".to_owned(),
        }
    }

    #[test]
    fn system_prompt_is_extracted() {
        let request = CompletionRequest::new(
            "claude-3-5-sonnet",
            vec![Message::system("be terse"), Message::user("hi")],
        );

        let wire = adapter().translate(&request).unwrap();
        let WireBody::Anthropic(body) = wire.body else {
            panic!("expected an Anthropic body");
        };

        assert_eq!(body.system.as_deref(), Some("be terse"));
        assert_eq!(body.messages, vec![AnthropicMessage {
            role: "user".to_owned(),
            content: "hi".to_owned(),
        }]);
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(body.stream, None);
    }

    #[test]
    fn sampling_params_map_to_anthropic_names() {
        let mut request = CompletionRequest::new("claude-3-5-sonnet", vec![Message::user("hi")]);
        request.stream = true;
        request.params = SamplingParams {
            max_tokens: Some(100),
            stop: Some(StopSequences::Many(vec!["\n\n".to_owned()])),
            presence_penalty: Some(1.0),
            n: Some(3),
            user: Some("u-9".to_owned()),
            ..SamplingParams::default()
        };

        let body = serde_json::to_value(adapter().translate(&request).unwrap().body).unwrap();

        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["stop_sequences"], json!(["\n\n"]));
        assert_eq!(body["metadata"]["user_id"], "u-9");
        assert_eq!(body["stream"], true);
        assert!(body.get("presence_penalty").is_none());
        assert!(body.get("n").is_none());
    }

    #[test]
    fn unary_text_blocks_are_concatenated() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "Hello, "},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "world"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });

        let response = adapter().normalize_unary(&body, "claude-3-5-sonnet").unwrap();

        assert_eq!(response.choices[0].message, Message::assistant("Hello, world"));
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn stream_events_map_to_chunks() {
        let adapter = adapter();
        let context = context();

        let start = event(json!({
            "type": "message_start",
            "message": {"id": "msg_01", "role": "assistant", "usage": {"input_tokens": 25, "output_tokens": 1}}
        }));
        let text = event(json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "Hi"}
        }));
        let stop = event(json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn"},
            "usage": {"output_tokens": 15}
        }));
        let ping = event(json!({"type": "ping"}));

        let first = adapter.normalize_chunk(&start, &context).unwrap().unwrap();
        assert_eq!(first.delta().unwrap().role, Some(Role::Assistant));

        let second = adapter.normalize_chunk(&text, &context).unwrap().unwrap();
        assert_eq!(second.delta().unwrap().content.as_deref(), Some("Hi"));

        let last = adapter.normalize_chunk(&stop, &context).unwrap().unwrap();
        assert_eq!(last.finish_reason(), Some("end_turn"));

        assert!(adapter.normalize_chunk(&ping, &context).unwrap().is_none());

        let mut usage = adapter.stream_usage(&start).unwrap();
        usage.merge(adapter.stream_usage(&stop).unwrap());
        assert_eq!((usage.prompt_tokens, usage.completion_tokens, usage.total_tokens), (25, 15, 40));
    }

    #[test]
    fn unknown_event_type_is_stream_parse_error() {
        let result = adapter().normalize_chunk(&event(json!({"type": "mystery"})), &context());
        assert!(matches!(result, Err(GatewayError::StreamParse(_))));
    }
}
