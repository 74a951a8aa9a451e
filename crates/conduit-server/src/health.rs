use axum::response::IntoResponse;
use http::StatusCode;

/// Liveness probe; the gateway holds no external connections to check
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
