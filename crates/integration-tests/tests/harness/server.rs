//! Test server wrapper that starts Conduit on a random port

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conduit_config::Config;
use conduit_core::{CompletionObserver, CompletionRecord, Observers};
use conduit_server::Server;
use tokio_util::sync::CancellationToken;

/// Observer that keeps every record for later assertions
#[derive(Default)]
pub struct RecordingObserver {
    records: Mutex<Vec<CompletionRecord>>,
}

#[async_trait]
impl CompletionObserver for RecordingObserver {
    async fn on_completion(&self, record: &CompletionRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    observer: Arc<RecordingObserver>,
}

impl TestServer {
    /// Start a test server with the given configuration
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let observer = Arc::new(RecordingObserver::default());
        let server = Server::with_observers(&config, Observers::new(vec![observer.clone()]))?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        let client = reqwest::Client::new();

        Ok(Self {
            addr,
            shutdown,
            client,
            observer,
        })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST a chat completion body to `/v1/chat/completions`
    pub async fn chat(&self, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/v1/chat/completions"))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Completion records delivered so far
    ///
    /// Streaming records are delivered from a background task after the
    /// stream ends, so this polls briefly until `expected` have arrived.
    pub async fn records(&self, expected: usize) -> Vec<CompletionRecord> {
        for _ in 0..50 {
            let records = self.observer.records.lock().unwrap().clone();
            if records.len() >= expected {
                return records;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.observer.records.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
