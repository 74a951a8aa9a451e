use std::time::Duration;

use conduit_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Errors that can occur while serving a completion
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid provider configuration or credential
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No configured provider pattern matches the requested model
    #[error("unsupported model: {model}")]
    UnsupportedModel { model: String },

    /// Client sent a malformed or invalid request
    #[error("invalid request: {0}")]
    Validation(String),

    /// Upstream provider answered with a non-success status
    #[error("provider {provider} returned {status}: {body}")]
    Upstream { provider: String, status: u16, body: String },

    /// Upstream provider did not answer in time
    #[error("provider {provider} timed out after {}ms", timeout.as_millis())]
    UpstreamTimeout { provider: String, timeout: Duration },

    /// Connection-level failure talking to the provider
    #[error("transport error talking to {provider}: {message}")]
    Transport { provider: String, message: String },

    /// Provider answered 2xx with a body that does not match its protocol
    #[error("malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    /// A single stream event could not be decoded
    #[error("stream parse error: {0}")]
    StreamParse(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Whether the orchestrator may retry the call that produced this error
    ///
    /// Only transient upstream conditions qualify: timeouts, transport
    /// failures, throttling and server-side errors.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamTimeout { .. } | Self::Transport { .. } => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether this error came from the upstream provider rather than the gateway
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. } | Self::UpstreamTimeout { .. } | Self::Transport { .. } | Self::MalformedResponse { .. }
        )
    }
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedModel { .. } => StatusCode::NOT_FOUND,
            Self::Upstream { .. } | Self::Transport { .. } | Self::MalformedResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Configuration(_) | Self::StreamParse(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::UnsupportedModel { .. } => "unsupported_model_error",
            Self::Validation(_) => "invalid_request_error",
            Self::Upstream { .. } | Self::MalformedResponse { .. } => "upstream_error",
            Self::UpstreamTimeout { .. } => "upstream_timeout_error",
            Self::Transport { .. } => "transport_error",
            Self::StreamParse(_) => "stream_parse_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }

    fn error_code(&self) -> Option<String> {
        match self {
            Self::Upstream { status, .. } => Some(status.to_string()),
            _ => None,
        }
    }
}
