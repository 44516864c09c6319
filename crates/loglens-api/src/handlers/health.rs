//! Health check handlers.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// GET /health
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /health/ready
pub async fn readiness() -> impl IntoResponse {
    StatusCode::OK
}
