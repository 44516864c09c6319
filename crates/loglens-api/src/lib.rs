//! # Loglens API
//!
//! REST surface for the detection and clustering orchestrator:
//!
//! - `POST /api/v1/logs` — submit a log through the real-time pipeline
//! - `GET  /api/v1/logs/{id}/verdicts` — append-only verdict history
//! - `POST /api/v1/clustering/run` — trigger a batch clustering run
//! - `GET  /api/v1/clusters/{id}` — cluster metadata with sample logs
//! - `GET  /api/v1/budget` — daily budget statistics
//! - `GET  /api/v1/pipeline/stats` — pipeline statistics
//! - `GET  /health`, `/health/live`, `/health/ready` — health checks

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::http::StatusCode;
use loglens_clustering::BatchClusteringEngine;
use loglens_core::budget::BudgetGuard;
use loglens_core::Error;
use loglens_detection::RealTimePipeline;
use loglens_storage::{ClusterStore, LogStore, VerdictStore};
use serde::{Deserialize, Serialize};

pub use routes::create_router;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub timeout_secs: u64,
    pub enable_logging: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            timeout_secs: 30,
            enable_logging: true,
        }
    }
}

impl ApiConfig {
    /// Read overrides from `LOGLENS_API_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("LOGLENS_API_BIND").unwrap_or(defaults.bind_addr),
            timeout_secs: std::env::var("LOGLENS_API_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            enable_logging: defaults.enable_logging,
        }
    }
}

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RealTimePipeline>,
    pub engine: Arc<BatchClusteringEngine>,
    pub logs: Arc<dyn LogStore>,
    pub verdicts: Arc<dyn VerdictStore>,
    pub clusters: Arc<dyn ClusterStore>,
    pub guard: BudgetGuard,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish()
    }
}

/// Success envelope wrapping handler payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Map orchestrator errors to HTTP statuses
pub fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::Config(_) => StatusCode::BAD_REQUEST,
        Error::Cancelled => StatusCode::CONFLICT,
        Error::ClusteringFailure(_) => StatusCode::BAD_GATEWAY,
        Error::BudgetExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(
            error_status(&Error::config("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(error_status(&Error::Cancelled), StatusCode::CONFLICT);
        assert_eq!(
            error_status(&Error::clustering("down")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&Error::storage("down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelopes_serialize() {
        let ok = serde_json::to_value(SuccessResponse::new(42)).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["data"], 42);

        let err = serde_json::to_value(ErrorResponse::new("boom")).unwrap();
        assert_eq!(err["success"], false);
    }
}
