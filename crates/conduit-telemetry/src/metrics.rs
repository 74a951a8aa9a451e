//! Metric names and the completion metrics recorder

use async_trait::async_trait;
use conduit_core::{CompletionObserver, CompletionRecord};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

pub const GATEWAY_REQUEST_COUNT: &str = "gateway.request.count";
pub const GATEWAY_REQUEST_DURATION: &str = "gateway.request.duration";
pub const GATEWAY_TOKEN_USAGE: &str = "gateway.token.usage";

/// Records request count, latency and token usage per completion
///
/// Instruments are created from the global meter provider, so they are
/// no-ops unless OTLP export was enabled by [`crate::init`].
pub struct MetricsObserver {
    requests: Counter<u64>,
    duration: Histogram<f64>,
    tokens: Counter<u64>,
}

impl MetricsObserver {
    /// Instruments on the global `conduit` meter
    pub fn new() -> Self {
        Self::with_meter(&opentelemetry::global::meter("conduit"))
    }

    /// Instruments on a specific meter
    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter(GATEWAY_REQUEST_COUNT)
                .with_description("Completed gateway requests")
                .build(),
            duration: meter
                .f64_histogram(GATEWAY_REQUEST_DURATION)
                .with_description("Upstream latency of gateway requests")
                .with_unit("s")
                .build(),
            tokens: meter
                .u64_counter(GATEWAY_TOKEN_USAGE)
                .with_description("Tokens reported by upstream providers")
                .build(),
        }
    }
}

impl Default for MetricsObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionObserver for MetricsObserver {
    async fn on_completion(&self, record: &CompletionRecord) {
        let attributes = [
            KeyValue::new("gen_ai.request.model", record.model.clone()),
            KeyValue::new("gen_ai.provider.name", record.provider.clone()),
            KeyValue::new("gateway.stream", record.stream),
            KeyValue::new("gateway.success", record.success),
        ];

        self.requests.add(1, &attributes);
        self.duration.record(record.latency.as_secs_f64(), &attributes);

        for (kind, count) in [("input", record.prompt_tokens), ("output", record.completion_tokens)] {
            if count > 0 {
                let mut token_attributes = attributes.to_vec();
                token_attributes.push(KeyValue::new("gen_ai.token.type", kind));
                self.tokens.add(u64::from(count), &token_attributes);
            }
        }
    }
}
