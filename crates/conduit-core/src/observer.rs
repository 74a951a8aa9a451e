//! Completion metadata handed to external collaborators
//!
//! The gateway does not persist anything. Once a request finishes it
//! builds a [`CompletionRecord`] and passes it to every registered
//! [`CompletionObserver`]; storing, billing or exporting the record is the
//! observer's business.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// Metadata describing one finished completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRecord {
    /// Model requested by the client
    pub model: String,
    /// Name of the provider that served (or failed) the request
    pub provider: String,
    /// Whether the request was streamed
    pub stream: bool,
    /// Prompt tokens reported by the provider
    pub prompt_tokens: u32,
    /// Completion tokens reported by the provider
    pub completion_tokens: u32,
    /// Total tokens reported by the provider
    pub total_tokens: u32,
    /// Wall time from dispatch to completion
    #[serde(with = "millis")]
    pub latency: Duration,
    /// Whether the request completed without an upstream failure
    pub success: bool,
}

/// Receiver of completion metadata
#[async_trait]
pub trait CompletionObserver: Send + Sync {
    /// Called once per finished request
    async fn on_completion(&self, record: &CompletionRecord);
}

/// Fan-out over a fixed set of observers
#[derive(Clone, Default)]
pub struct Observers {
    inner: Arc<Vec<Arc<dyn CompletionObserver>>>,
}

impl Observers {
    /// Build from a list of observers
    pub fn new(observers: Vec<Arc<dyn CompletionObserver>>) -> Self {
        Self {
            inner: Arc::new(observers),
        }
    }

    /// Whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Deliver a record to every observer in registration order
    pub async fn notify(&self, record: &CompletionRecord) {
        for observer in self.inner.iter() {
            observer.on_completion(record).await;
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers").field("count", &self.inner.len()).finish()
    }
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(duration.as_millis())
    }
}
