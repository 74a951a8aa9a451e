use async_trait::async_trait;
use conduit_core::{CompletionObserver, CompletionRecord};

/// Logs one structured line per finished completion
#[derive(Debug, Default)]
pub struct LogObserver;

#[async_trait]
impl CompletionObserver for LogObserver {
    async fn on_completion(&self, record: &CompletionRecord) {
        let latency_ms = u64::try_from(record.latency.as_millis()).unwrap_or(u64::MAX);

        if record.success {
            tracing::info!(
                model = %record.model,
                provider = %record.provider,
                stream = record.stream,
                prompt_tokens = record.prompt_tokens,
                completion_tokens = record.completion_tokens,
                total_tokens = record.total_tokens,
                latency_ms,
                "completion finished"
            );
        } else {
            tracing::warn!(
                model = %record.model,
                provider = %record.provider,
                stream = record.stream,
                latency_ms,
                "completion failed"
            );
        }
    }
}
