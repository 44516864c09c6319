//! Budget and pipeline statistics handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::instrument;

use crate::{AppState, SuccessResponse};

/// GET /api/v1/budget
#[instrument(skip(state))]
pub async fn budget_stats(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(SuccessResponse::new(state.guard.stats())),
    )
}

/// GET /api/v1/pipeline/stats
#[instrument(skip(state))]
pub async fn pipeline_stats(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(SuccessResponse::new(state.pipeline.stats().await)),
    )
}
