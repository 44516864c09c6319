//! Batch clustering handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use loglens_clustering::{CancelHandle, ClusteringRunParams};
use loglens_core::types::ClusterMetadata;
use serde::Serialize;
use tracing::{info, instrument};

use crate::{error_status, AppState, ErrorResponse, SuccessResponse};

/// POST /api/v1/clustering/run
///
/// Body is optional; when present it overrides the configured parameters
/// for this run only.
#[instrument(skip(state, params))]
pub async fn trigger_clustering(
    State(state): State<AppState>,
    params: Option<Json<ClusteringRunParams>>,
) -> impl IntoResponse {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    info!(?params, "clustering run requested");

    match state.engine.run(&params, &CancelHandle::new()).await {
        Ok(summary) => (StatusCode::OK, Json(SuccessResponse::new(summary))).into_response(),
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// Cluster metadata plus a readable sample of member logs
#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    #[serde(flatten)]
    pub metadata: ClusterMetadata,
    pub sample_logs: Vec<SampleLog>,
}

#[derive(Debug, Serialize)]
pub struct SampleLog {
    pub id: uuid::Uuid,
    pub level: String,
    pub service: Option<String>,
    pub message: String,
}

/// GET /api/v1/clusters/{id}
#[instrument(skip(state))]
pub async fn get_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<u32>,
) -> impl IntoResponse {
    let metadata = match state.clusters.metadata(cluster_id).await {
        Ok(Some(metadata)) => metadata,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(format!("cluster {cluster_id} not found"))),
            )
                .into_response();
        }
        Err(e) => {
            return (
                error_status(&e),
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response();
        }
    };

    let mut sample_logs = Vec::new();
    for log_id in &metadata.representatives {
        if let Ok(Some(stored)) = state.logs.get(*log_id).await {
            sample_logs.push(SampleLog {
                id: stored.record.id,
                level: stored.record.level.to_string(),
                service: stored.record.service,
                message: stored.redacted.text,
            });
        }
    }

    (
        StatusCode::OK,
        Json(SuccessResponse::new(ClusterResponse {
            metadata,
            sample_logs,
        })),
    )
        .into_response()
}
