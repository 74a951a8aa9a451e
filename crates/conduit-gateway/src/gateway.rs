//! Request orchestration: resolve, translate, dispatch, normalize

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conduit_config::{Config, RetryConfig};
use conduit_core::{CompletionRecord, Observers};
use futures_util::{Stream, StreamExt, stream};

use crate::dispatch::Dispatcher;
use crate::error::GatewayError;
use crate::protocol::WireRequest;
use crate::provider::{ProviderAdapter, ProviderRegistry, unix_now};
use crate::resolver::{ProviderResolver, ResolvedProvider};
use crate::sse::{SseData, SseEvent, sse_stream};
use crate::types::{CompletionRequest, CompletionResponse, StreamChunk, StreamContext, Usage};

/// Canonical chunks produced by a streaming completion
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, GatewayError>> + Send>>;

type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, GatewayError>> + Send>>;

/// Steps a request goes through, logged as it advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolving,
    Translating,
    Dispatching,
    Streaming,
    Completed,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Translating => "translating",
            Self::Dispatching => "dispatching",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn enter(phase: Phase, model: &str) {
    tracing::debug!(phase = %phase, model, "request phase");
}

/// Everything needed to call the upstream once a request is prepared
struct Prepared {
    provider: ResolvedProvider,
    adapter: Arc<dyn ProviderAdapter>,
    wire: WireRequest,
}

/// Shared gateway state
///
/// Built once from configuration; cheap to clone into request handlers.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    resolver: ProviderResolver,
    registry: ProviderRegistry,
    dispatcher: Dispatcher,
    retry: RetryConfig,
    observers: Observers,
}

impl Gateway {
    /// Build the gateway from configuration
    ///
    /// Fails if a provider pattern does not compile or a provider names a
    /// protocol without an adapter.
    pub fn from_config(config: &Config, observers: Observers) -> Result<Self, GatewayError> {
        Self::with_dispatcher(config, observers, Dispatcher::default())
    }

    /// Build the gateway with a preconfigured dispatcher
    pub fn with_dispatcher(config: &Config, observers: Observers, dispatcher: Dispatcher) -> Result<Self, GatewayError> {
        let providers: Vec<_> = config.providers.iter().cloned().map(Arc::new).collect();

        let registry = ProviderRegistry::from_providers(&providers)?;
        let resolver = ProviderResolver::new(&providers)?;

        tracing::info!(providers = providers.len(), "gateway initialized");

        Ok(Self {
            inner: Arc::new(GatewayInner {
                resolver,
                registry,
                dispatcher,
                retry: config.gateway.retry.clone(),
                observers,
            }),
        })
    }

    /// Configured `(pattern, provider)` pairs in resolution order
    pub fn models(&self) -> Vec<(String, String)> {
        self.inner
            .resolver
            .providers()
            .flat_map(|(config, patterns)| patterns.map(|pattern| (pattern.to_owned(), config.name.clone())))
            .collect()
    }

    /// Execute a non-streaming completion
    pub async fn complete(&self, mut request: CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        request.stream = false;
        let prepared = self.prepare(&request)?;
        let started = Instant::now();

        enter(Phase::Dispatching, &request.model);
        let result = self
            .with_retry(&request.model, || {
                self.inner
                    .dispatcher
                    .dispatch_unary(prepared.adapter.as_ref(), &prepared.wire, &prepared.provider)
            })
            .await
            .and_then(|body| prepared.adapter.normalize_unary(&body, &request.model));

        let usage = match &result {
            Ok(response) => {
                enter(Phase::Completed, &request.model);
                enter(Phase::Done, &request.model);
                response.usage
            }
            Err(e) => {
                enter(Phase::Failed, &request.model);
                tracing::warn!(model = %request.model, provider = %prepared.provider.name(), error = %e, "completion failed");
                Usage::default()
            }
        };

        let record = completion_record(
            &request.model,
            prepared.provider.name(),
            false,
            usage,
            started.elapsed(),
            result.is_ok(),
        );
        self.inner.observers.notify(&record).await;

        result
    }

    /// Execute a streaming completion
    ///
    /// Failures before the upstream stream opens are returned like unary
    /// failures. Afterwards, chunks are produced only as the returned
    /// stream is polled; dropping it aborts the upstream read.
    pub async fn complete_stream(&self, mut request: CompletionRequest) -> Result<ChunkStream, GatewayError> {
        request.stream = true;
        let prepared = self.prepare(&request)?;
        let started = Instant::now();

        enter(Phase::Dispatching, &request.model);
        let opened = self
            .with_retry(&request.model, || {
                self.inner
                    .dispatcher
                    .dispatch_stream(prepared.adapter.as_ref(), &prepared.wire, &prepared.provider)
            })
            .await;

        let bytes = match opened {
            Ok(bytes) => bytes,
            Err(e) => {
                enter(Phase::Failed, &request.model);
                tracing::warn!(model = %request.model, provider = %prepared.provider.name(), error = %e, "stream failed to open");
                let record = completion_record(
                    &request.model,
                    prepared.provider.name(),
                    true,
                    Usage::default(),
                    started.elapsed(),
                    false,
                );
                self.inner.observers.notify(&record).await;
                return Err(e);
            }
        };

        let state = StreamState {
            events: Box::pin(sse_stream(bytes)),
            adapter: prepared.adapter,
            context: StreamContext {
                id: crate::provider::completion_id(),
                created: unix_now(),
                model: request.model,
            },
            provider: prepared.provider.config.name.clone(),
            usage: Usage::default(),
            chunks: 0,
            outcome: StreamOutcome::Open,
            started,
            observers: self.inner.observers.clone(),
        };

        Ok(Box::pin(chunk_stream(state)))
    }

    /// Validate, resolve and translate without touching the network
    fn prepare(&self, request: &CompletionRequest) -> Result<Prepared, GatewayError> {
        let prepared = self.try_prepare(request);

        if let Err(e) = &prepared {
            enter(Phase::Failed, &request.model);
            tracing::debug!(model = %request.model, error = %e, "request rejected before dispatch");
        }

        prepared
    }

    fn try_prepare(&self, request: &CompletionRequest) -> Result<Prepared, GatewayError> {
        request.validate()?;

        enter(Phase::Resolving, &request.model);
        let provider = self.inner.resolver.resolve(&request.model)?;
        let adapter = Arc::clone(self.inner.registry.adapter(provider.name())?);

        enter(Phase::Translating, &request.model);
        let wire = adapter.translate(request)?;

        Ok(Prepared { provider, adapter, wire })
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    async fn with_retry<T, F, Fut>(&self, model: &str, mut call: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let retry = &self.inner.retry;
        let mut attempt = 1;

        loop {
            match call().await {
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    tracing::warn!(
                        model,
                        attempt,
                        max_attempts = retry.max_attempts,
                        error = %e,
                        "retrying upstream call"
                    );
                    tokio::time::sleep(retry.backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn completion_record(
    model: &str,
    provider: &str,
    stream: bool,
    usage: Usage,
    latency: Duration,
    success: bool,
) -> CompletionRecord {
    CompletionRecord {
        model: model.to_owned(),
        provider: provider.to_owned(),
        stream,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        latency,
        success,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    Open,
    Completed,
    Failed,
}

/// Per-stream state carried through the unfold
///
/// Dropping it reports the stream exactly once, whether it finished,
/// failed, or was abandoned by the client.
struct StreamState {
    events: EventStream,
    adapter: Arc<dyn ProviderAdapter>,
    context: StreamContext,
    provider: String,
    usage: Usage,
    chunks: usize,
    outcome: StreamOutcome,
    started: Instant,
    observers: Observers,
}

impl StreamState {
    /// Mark the stream as ended; the record is sent when the state drops
    fn finish(&mut self, outcome: StreamOutcome) {
        self.outcome = outcome;

        let phase = match outcome {
            StreamOutcome::Completed => Phase::Done,
            StreamOutcome::Failed | StreamOutcome::Open => Phase::Failed,
        };
        enter(phase, &self.context.model);
    }
}

impl Drop for StreamState {
    fn drop(&mut self) {
        let model = &self.context.model;

        if self.outcome == StreamOutcome::Open {
            tracing::debug!(model = %model, chunks = self.chunks, "stream dropped before completion");
        }

        if self.observers.is_empty() {
            return;
        }

        let record = completion_record(
            model,
            &self.provider,
            true,
            self.usage,
            self.started.elapsed(),
            self.outcome == StreamOutcome::Completed,
        );

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let observers = self.observers.clone();
            handle.spawn(async move {
                observers.notify(&record).await;
            });
        }
    }
}

fn chunk_stream(state: StreamState) -> impl Stream<Item = Result<StreamChunk, GatewayError>> + Send {
    stream::unfold(state, |mut state| async move {
        if state.outcome != StreamOutcome::Open {
            return None;
        }

        loop {
            let event = match state.events.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    tracing::warn!(provider = %state.provider, error = %e, "upstream stream broke");
                    state.finish(StreamOutcome::Failed);
                    return Some((Err(e), state));
                }
                None => {
                    state.finish(StreamOutcome::Completed);
                    return None;
                }
            };

            if event.data == SseData::Done {
                state.finish(StreamOutcome::Completed);
                return None;
            }

            if let Some(usage) = state.adapter.stream_usage(&event) {
                state.usage.merge(usage);
            }

            match state.adapter.normalize_chunk(&event, &state.context) {
                Ok(Some(chunk)) => {
                    if state.chunks == 0 {
                        enter(Phase::Streaming, &state.context.model);
                    }
                    state.chunks += 1;
                    return Some((Ok(chunk), state));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(provider = %state.provider, error = %e, "skipping unparseable stream event");
                }
            }
        }
    })
}
