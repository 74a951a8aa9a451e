//! Outbound HTTP calls to upstream providers

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use conduit_config::{AuthType, ProviderConfig};
use futures_util::{Stream, StreamExt};
use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::error::GatewayError;
use crate::protocol::WireRequest;
use crate::provider::ProviderAdapter;
use crate::resolver::ResolvedProvider;

/// Raw upstream response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GatewayError>> + Send>>;

/// Sends wire requests with the provider's credential and timeout
///
/// Never retries; retry policy belongs to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    client: Client,
}

impl Dispatcher {
    /// Dispatcher sharing an existing connection pool
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Send a unary request and decode the JSON body
    ///
    /// The timeout covers sending and reading the whole body.
    pub async fn dispatch_unary(
        &self,
        adapter: &dyn ProviderAdapter,
        wire: &WireRequest,
        provider: &ResolvedProvider,
    ) -> Result<Value, GatewayError> {
        let config = provider.config.as_ref();
        let request = self.build(adapter, wire, provider)?;

        with_timeout(config, async {
            let response = request.send().await.map_err(|e| request_error(config, e))?;
            let response = check_status(config, response).await?;
            let body = response.bytes().await.map_err(|e| request_error(config, e))?;

            serde_json::from_slice(&body).map_err(|e| GatewayError::MalformedResponse {
                provider: config.name.clone(),
                message: format!("response body is not JSON: {e}"),
            })
        })
        .await
    }

    /// Open a streaming request and return its body as bytes
    ///
    /// The timeout covers connecting and receiving the response headers;
    /// the body itself is read as the caller polls.
    pub async fn dispatch_stream(
        &self,
        adapter: &dyn ProviderAdapter,
        wire: &WireRequest,
        provider: &ResolvedProvider,
    ) -> Result<ByteStream, GatewayError> {
        let config = provider.config.as_ref();
        let request = self.build(adapter, wire, provider)?;

        let response = with_timeout(config, async {
            let response = request.send().await.map_err(|e| request_error(config, e))?;
            check_status(config, response).await
        })
        .await?;

        let name = config.name.clone();
        let bytes = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| GatewayError::Transport {
                    provider: name.clone(),
                    message: e.without_url().to_string(),
                })
            });

        Ok(Box::pin(bytes))
    }

    fn build(
        &self,
        adapter: &dyn ProviderAdapter,
        wire: &WireRequest,
        provider: &ResolvedProvider,
    ) -> Result<reqwest::RequestBuilder, GatewayError> {
        let config = provider.config.as_ref();
        let mut url = adapter.endpoint(&wire.model, wire.stream)?;
        let mut headers = HeaderMap::new();

        for (name, value) in adapter.default_headers() {
            headers.insert(HeaderName::from_static(*name), HeaderValue::from_static(*value));
        }

        for (name, value) in &config.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| GatewayError::Configuration(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| GatewayError::Configuration(format!("invalid value for header '{name}': {e}")))?;
            headers.insert(name, value);
        }

        let secret = provider.credential.expose_secret();
        match config.auth_type {
            AuthType::Bearer => {
                headers.insert(AUTHORIZATION, sensitive_value(&format!("Bearer {secret}"))?);
            }
            AuthType::Header => {
                let name = HeaderName::try_from(config.auth_header())
                    .map_err(|e| GatewayError::Configuration(format!("invalid auth_header: {e}")))?;
                headers.insert(name, sensitive_value(secret)?);
            }
            AuthType::Query => {
                url.query_pairs_mut().append_pair("key", secret);
            }
            AuthType::None => {}
        }

        tracing::debug!(provider = %config.name, endpoint = %url.path(), stream = wire.stream, "dispatching upstream request");

        Ok(self.client.post(url).headers(headers).json(&wire.body))
    }
}

fn sensitive_value(value: &str) -> Result<HeaderValue, GatewayError> {
    let mut value = HeaderValue::try_from(value)
        .map_err(|_| GatewayError::Configuration("credential is not a valid header value".to_owned()))?;
    value.set_sensitive(true);
    Ok(value)
}

async fn with_timeout<T>(
    config: &ProviderConfig,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(config.timeout, call)
        .await
        .unwrap_or_else(|_| Err(timed_out(config, config.timeout)))
}

fn timed_out(config: &ProviderConfig, timeout: Duration) -> GatewayError {
    tracing::warn!(provider = %config.name, timeout_ms = timeout.as_millis(), "upstream call timed out");
    GatewayError::UpstreamTimeout {
        provider: config.name.clone(),
        timeout,
    }
}

/// Map a client error, keeping the URL (and any query credential) out of it
fn request_error(config: &ProviderConfig, error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        return timed_out(config, config.timeout);
    }

    let error = error.without_url();
    tracing::error!(provider = %config.name, error = %error, "upstream request failed");
    GatewayError::Transport {
        provider: config.name.clone(),
        message: error.to_string(),
    }
}

async fn check_status(config: &ProviderConfig, response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider = %config.name, status = %status, "upstream returned error");

    Err(GatewayError::Upstream {
        provider: config.name.clone(),
        status: status.as_u16(),
        body,
    })
}
