//! Provider adapters: request translation and response normalization
//!
//! Each upstream protocol has one adapter. Adapters are pure: they turn a
//! canonical request into a wire request and provider JSON back into
//! canonical types. Network I/O lives in [`crate::dispatch`].

pub mod anthropic;
pub mod google;
pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use conduit_config::ProviderConfig;
use serde_json::Value;
use url::Url;

use crate::error::GatewayError;
use crate::protocol::WireRequest;
use crate::sse::SseEvent;
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, StreamChunk, StreamContext, Usage};

/// How a provider expects the system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPrompt {
    /// System message stays in the message array
    Inline,
    /// System text is moved to a dedicated request field
    Extracted,
}

/// Translation and normalization for one upstream protocol
pub trait ProviderAdapter: Send + Sync {
    /// Protocol name as used in configuration
    fn protocol(&self) -> &'static str;

    /// Where the system prompt goes on the wire
    fn system_prompt(&self) -> SystemPrompt;

    /// Full URL for a call to `model`
    fn endpoint(&self, model: &str, stream: bool) -> Result<Url, GatewayError>;

    /// Headers the protocol requires on every call
    ///
    /// Configured headers with the same name take precedence.
    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Canonical request to provider wire request
    fn translate(&self, request: &CompletionRequest) -> Result<WireRequest, GatewayError>;

    /// Provider unary response to canonical response
    fn normalize_unary(&self, body: &Value, requested_model: &str) -> Result<CompletionResponse, GatewayError>;

    /// One provider stream event to a canonical chunk
    ///
    /// Returns `Ok(None)` for events that carry no role, content or finish
    /// reason, and [`GatewayError::StreamParse`] for events that do not
    /// match the provider's schema.
    fn normalize_chunk(&self, event: &SseEvent, context: &StreamContext) -> Result<Option<StreamChunk>, GatewayError>;

    /// Token usage carried by a stream event, if any
    fn stream_usage(&self, event: &SseEvent) -> Option<Usage>;
}

/// Build the adapter for a configured provider
fn build_adapter(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
    let adapter: Arc<dyn ProviderAdapter> = match config.protocol() {
        openai::PROTOCOL => Arc::new(openai::OpenAiAdapter::new(config)),
        anthropic::PROTOCOL => Arc::new(anthropic::AnthropicAdapter::new(config)),
        google::PROTOCOL => Arc::new(google::GoogleAdapter::new(config)),
        other => {
            return Err(GatewayError::Configuration(format!(
                "provider '{}' uses unknown protocol '{other}'",
                config.name
            )));
        }
    };

    Ok(adapter)
}

/// Adapter per configured provider, built once at startup
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Build adapters for every provider
    ///
    /// Fails if any provider names a protocol without an adapter.
    pub fn from_providers(providers: &[Arc<ProviderConfig>]) -> Result<Self, GatewayError> {
        let adapters = providers
            .iter()
            .map(|config| {
                let adapter = build_adapter(config)?;
                tracing::debug!(provider = %config.name, protocol = adapter.protocol(), "registered provider");
                Ok((config.name.clone(), adapter))
            })
            .collect::<Result<_, GatewayError>>()?;

        Ok(Self { adapters })
    }

    /// Adapter for a provider resolved from the same configuration
    pub fn adapter(&self, provider: &str) -> Result<&Arc<dyn ProviderAdapter>, GatewayError> {
        self.adapters
            .get(provider)
            .ok_or_else(|| GatewayError::Configuration(format!("provider '{provider}' has no adapter")))
    }
}

/// Messages split into the authoritative system prompt and the rest
///
/// Indices refer to positions in the original message list.
#[derive(Debug)]
pub struct PartitionedMessages<'a> {
    pub system: Option<(usize, &'a Message)>,
    pub conversation: Vec<(usize, &'a Message)>,
}

impl<'a> PartitionedMessages<'a> {
    /// Text of the system prompt
    pub fn system_text(&self) -> Option<&'a str> {
        self.system.map(|(_, message)| message.content.as_str())
    }

    /// Non-system messages in order
    pub fn conversation(&self) -> impl Iterator<Item = &'a Message> + '_ {
        self.conversation.iter().map(|(_, message)| *message)
    }

    /// All messages with the system prompt at its original position
    pub fn inline(&self) -> Vec<&'a Message> {
        let mut merged: Vec<(usize, &Message)> = self.conversation.clone();
        if let Some(system) = self.system {
            let at = merged.partition_point(|(index, _)| *index < system.0);
            merged.insert(at, system);
        }
        merged.into_iter().map(|(_, message)| message).collect()
    }
}

/// Separate the system prompt from the conversation
///
/// Later system messages replace earlier ones. Messages with a role the
/// gateway does not translate are dropped with a warning. A conversation
/// left empty is a validation error.
pub fn partition_system(messages: &[Message]) -> Result<PartitionedMessages<'_>, GatewayError> {
    let mut system = None;
    let mut conversation = Vec::with_capacity(messages.len());

    for (index, message) in messages.iter().enumerate() {
        match &message.role {
            Role::System => {
                if system.is_some() {
                    tracing::debug!(index, "later system message replaces an earlier one");
                }
                system = Some((index, message));
            }
            Role::User | Role::Assistant => conversation.push((index, message)),
            Role::Unsupported(role) => {
                tracing::warn!(index, role = %role, "dropping message with unsupported role");
            }
        }
    }

    if conversation.is_empty() {
        return Err(GatewayError::Validation(
            "request has no user or assistant messages".to_owned(),
        ));
    }

    Ok(PartitionedMessages { system, conversation })
}

/// `<base_url>/<path>` without doubling slashes
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, GatewayError> {
    let base = base.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{path}")).map_err(|e| GatewayError::Configuration(format!("invalid endpoint URL: {e}")))
}

/// Identifier for a canonical response
pub(crate) fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Current Unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Decode a JSON payload into a wire type, reporting `provider` on failure
pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(provider: &str, body: &Value) -> Result<T, GatewayError> {
    T::deserialize(body).map_err(|e| GatewayError::MalformedResponse {
        provider: provider.to_owned(),
        message: e.to_string(),
    })
}

/// Decode a stream event payload into a wire type
pub(crate) fn decode_event<T: serde::de::DeserializeOwned>(event: &SseEvent) -> Result<Option<T>, GatewayError> {
    let Some(json) = event.json() else {
        return Ok(None);
    };

    T::deserialize(json)
        .map(Some)
        .map_err(|e| GatewayError::StreamParse(e.to_string()))
}
