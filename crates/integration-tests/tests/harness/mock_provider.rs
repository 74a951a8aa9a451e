//! Mock upstream provider for integration tests
//!
//! Accepts any POST, records it, and answers with a scripted reply. The
//! wire format is whatever the test scripts, so one mock serves the
//! `OpenAI`, Anthropic and Google protocols alike.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use tokio_util::sync::CancellationToken;

/// Scripted upstream answer
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with a JSON body
    Json(serde_json::Value),
    /// 200 `text/event-stream`; each frame is sent as its own body chunk,
    /// and split in the middle to exercise partial reads
    Sse(Vec<String>),
    /// Like `Sse`, then the connection is aborted instead of ending cleanly
    SseThenAbort(Vec<String>),
    /// Error status with a raw body
    Status(u16, String),
}

/// One request as the mock received it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

struct MockState {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock provider backend
pub struct MockProvider {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockProvider {
    /// Answer every request with `reply`
    pub async fn start(reply: Reply) -> Self {
        Self::start_scripted(Vec::new(), reply, Duration::ZERO).await
    }

    /// Answer every request with `reply` after `delay`
    pub async fn start_slow(reply: Reply, delay: Duration) -> Self {
        Self::start_scripted(Vec::new(), reply, delay).await
    }

    /// Answer with `script` in order, then with `fallback`
    pub async fn start_scripted(script: Vec<Reply>, fallback: Reply, delay: Duration) -> Self {
        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            fallback,
            delay,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Self { addr, shutdown, state }
    }

    /// Base URL with a path prefix, e.g. `base_url("/v1")`
    pub fn base_url(&self, prefix: &str) -> String {
        format!("http://{}{prefix}", self.addr)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of requests received
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// The only request received, panicking if there were more or none
    pub fn single_request(&self) -> RecordedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one upstream request");
        requests.into_iter().next().unwrap()
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest {
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| state.fallback.clone());

    match reply {
        Reply::Json(value) => axum::Json(value).into_response(),
        Reply::Status(status, body) => (StatusCode::from_u16(status).unwrap(), body).into_response(),
        Reply::Sse(frames) => sse_response(frames, false),
        Reply::SseThenAbort(frames) => sse_response(frames, true),
    }
}

fn sse_response(frames: Vec<String>, abort: bool) -> Response {
    let mut pieces: Vec<Result<Bytes, io::Error>> = frames
        .into_iter()
        .flat_map(|frame| {
            let bytes = frame.into_bytes();
            let mid = bytes.len() / 2;
            [Bytes::copy_from_slice(&bytes[..mid]), Bytes::copy_from_slice(&bytes[mid..])]
        })
        .map(Ok)
        .collect();

    if abort {
        pieces.push(Err(io::Error::other("upstream connection reset")));
    }

    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(stream::iter(pieces)))
        .unwrap()
}
