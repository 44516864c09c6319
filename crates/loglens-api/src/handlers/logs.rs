//! Log submission and verdict history handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use loglens_core::types::{DetectionVerdict, LogLevel, LogRecord};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{error_status, AppState, ErrorResponse, SuccessResponse};

/// Request to run a log through the real-time pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitLogRequest {
    pub message: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Client-supplied id makes submission idempotent
    #[serde(default)]
    pub id: Option<Uuid>,
}

impl SubmitLogRequest {
    fn into_record(self) -> LogRecord {
        let level = self
            .level
            .as_deref()
            .map(LogLevel::parse)
            .unwrap_or(LogLevel::Unknown);
        let mut record = LogRecord::new(self.message, self.service, level);
        if let Some(id) = self.id {
            record.id = id;
        }
        if let Some(timestamp) = self.timestamp {
            record.timestamp = timestamp;
        }
        record
    }
}

/// POST /api/v1/logs
#[instrument(skip(state, request))]
pub async fn submit_log(
    State(state): State<AppState>,
    Json(request): Json<SubmitLogRequest>,
) -> impl IntoResponse {
    let record = request.into_record();
    let log_id = record.id;

    match state.pipeline.submit_log(record).await {
        Ok(verdict) => {
            info!(log_id = %log_id, method = ?verdict.method, "log submitted");
            (StatusCode::OK, Json(SuccessResponse::new(verdict))).into_response()
        }
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// GET /api/v1/logs/{id}/verdicts
#[instrument(skip(state))]
pub async fn verdict_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.verdicts.history(id).await {
        Ok(history) if history.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("no verdicts for log {id}"))),
        )
            .into_response(),
        Ok(history) => {
            let history: Vec<DetectionVerdict> = history;
            (StatusCode::OK, Json(SuccessResponse::new(history))).into_response()
        }
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}
