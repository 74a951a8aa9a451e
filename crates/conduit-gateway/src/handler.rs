//! Axum route handlers for the `OpenAI`-compatible API

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use conduit_core::HttpError;
use futures_util::{Stream, StreamExt, stream};
use serde::Serialize;

use crate::error::GatewayError;
use crate::gateway::{ChunkStream, Gateway};
use crate::provider::unix_now;
use crate::types::CompletionRequest;

/// Build the gateway router with all endpoints
pub fn gateway_router(gateway: Gateway) -> Router {
    Router::new()
        .route("/chat/completions", routing::post(chat_completions))
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/models", routing::get(list_models))
        .with_state(gateway)
}

/// Handle `POST /chat/completions` and `POST /v1/chat/completions`
async fn chat_completions(
    State(gateway): State<Gateway>,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(&GatewayError::Validation(rejection.body_text()));
        }
    };

    if request.stream {
        match gateway.complete_stream(request).await {
            Ok(chunks) => stream_response(chunks).into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        match gateway.complete(request).await {
            Ok(response) => Json(response).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

#[derive(Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<Model>,
}

#[derive(Serialize)]
struct Model {
    id: String,
    object: &'static str,
    created: u64,
    owned_by: String,
}

/// Handle `GET /v1/models`
async fn list_models(State(gateway): State<Gateway>) -> Json<ModelList> {
    let created = unix_now();

    let data = gateway
        .models()
        .into_iter()
        .map(|(pattern, provider)| Model {
            id: pattern,
            object: "model",
            created,
            owned_by: provider,
        })
        .collect();

    Json(ModelList { object: "list", data })
}

/// SSE response of canonical chunks terminated by `[DONE]`
///
/// An upstream failure mid-stream aborts the response without `[DONE]`.
fn stream_response(chunks: ChunkStream) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = chunks
        .map(|result| match result {
            Ok(chunk) => Event::default().json_data(&chunk).map_err(axum::Error::new),
            Err(e) => Err(axum::Error::new(e)),
        })
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Convert a gateway error to an `OpenAI`-style JSON error response
fn error_response(error: &GatewayError) -> Response {
    if error.is_upstream() {
        tracing::warn!(error = %error, "upstream provider call failed");
    } else {
        tracing::debug!(error = %error, "request rejected");
    }

    let body = serde_json::json!({
        "error": {
            "message": error.client_message(),
            "type": error.error_type(),
            "code": error.error_code(),
        }
    });

    (error.status_code(), Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use conduit_config::Config;
    use conduit_core::Observers;
    use tower::ServiceExt;

    use super::*;

    fn router() -> Router {
        let config = Config::from_toml(
            r#"
            [[providers]]
            name = "openai"
            base_url = "http://127.0.0.1:9/v1"
            auth_type = "none"
            patterns = ["gpt-"]
            "#,
        )
        .unwrap();
        gateway_router(Gateway::from_config(&config, Observers::default()).unwrap())
    }

    async fn post(body: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .oneshot(
                Request::post("/v1/chat/completions")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_owned()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_request() {
        let (status, body) = post(r#"{"model": "gpt-4o""#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let (status, body) = post(r#"{"model": "gpt-4o", "messages": []}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"].as_str().unwrap().contains("messages"));
    }

    #[tokio::test]
    async fn unknown_model_is_not_found() {
        let (status, body) = post(r#"{"model": "unknown-model-xyz", "messages": [{"role": "user", "content": "hi"}]}"#).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "unsupported_model_error");
        assert!(body["error"]["code"].is_null());
    }

    #[tokio::test]
    async fn models_lists_patterns() {
        let response = router()
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["id"], "gpt-");
        assert_eq!(body["data"][0]["owned_by"], "openai");
    }
}
