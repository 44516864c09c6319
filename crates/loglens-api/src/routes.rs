//! API route definitions.

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    budget::{budget_stats, pipeline_stats},
    clustering::{get_cluster, trigger_clustering},
    health::{health, liveness, readiness},
    logs::{submit_log, verdict_history},
};
use crate::middleware::logging_middleware;
use crate::{ApiConfig, AppState};

/// Build the router for the unified service
pub fn create_router(config: ApiConfig, state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/logs", post(submit_log))
        .route("/logs/:id/verdicts", get(verdict_history))
        .route("/clustering/run", post(trigger_clustering))
        .route("/clusters/:id", get(get_cluster))
        .route("/budget", get(budget_stats))
        .route("/pipeline/stats", get(pipeline_stats))
        .with_state(state);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness));

    let app = Router::new().nest("/api/v1", api_v1).merge(health_routes);

    let app = if config.enable_logging {
        app.layer(middleware::from_fn(logging_middleware))
    } else {
        app
    };

    app.layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loglens_clustering::{BatchClusteringEngine, OutlierSweep};
    use loglens_core::budget::BudgetGuard;
    use loglens_core::cache::EmbeddingCache;
    use loglens_core::config::Config;
    use loglens_core::traits::{
        ClusteringBackend, ClusteringParams, EmbeddingProvider, EmbeddingResponse, LlmClient,
        LlmRequest, RawScore, RedactionResult, Redactor, ScoringBackend,
    };
    use loglens_core::types::FeatureVector;
    use loglens_core::Result;
    use loglens_detection::{FastScorer, RealTimePipeline, SemanticValidator};
    use loglens_storage::{
        InMemoryClusterStore, InMemoryLogStore, InMemoryVectorStore, InMemoryVerdictStore,
    };
    use std::sync::Arc;

    #[derive(Debug)]
    struct Stub;

    #[async_trait]
    impl Redactor for Stub {
        async fn redact(&self, text: &str) -> Result<RedactionResult> {
            Ok(RedactionResult {
                text: text.to_string(),
                entities: Default::default(),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Stub {
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
            Ok(EmbeddingResponse {
                vector: vec![0.0; 4],
                tokens: 1,
            })
        }
    }

    #[async_trait]
    impl ScoringBackend for Stub {
        async fn score(&self, _features: &FeatureVector) -> Result<RawScore> {
            Ok(RawScore {
                score: 0.0,
                is_anomaly: false,
            })
        }
    }

    #[async_trait]
    impl LlmClient for Stub {
        async fn complete(&self, _request: &LlmRequest) -> Result<String> {
            Ok("{}".to_string())
        }
    }

    #[async_trait]
    impl ClusteringBackend for Stub {
        async fn cluster(
            &self,
            vectors: &[Vec<f32>],
            _params: &ClusteringParams,
        ) -> Result<Vec<i32>> {
            Ok(vec![0; vectors.len()])
        }
    }

    #[test]
    fn test_router_creation() {
        let config = Config::default();
        let guard = BudgetGuard::new(config.budget.daily_budget_usd);
        let stub = Arc::new(Stub);

        let logs = Arc::new(InMemoryLogStore::new());
        let verdicts = Arc::new(InMemoryVerdictStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let clusters = Arc::new(InMemoryClusterStore::new());

        let cache = Arc::new(EmbeddingCache::new(
            stub.clone(),
            guard.clone(),
            config.cache.capacity,
        ));
        let validator = Arc::new(SemanticValidator::new(
            stub.clone(),
            guard.clone(),
            config.detection.validation_confidence_threshold,
        ));
        let pipeline = Arc::new(RealTimePipeline::new(
            stub.clone(),
            cache,
            FastScorer::new(stub.clone()),
            validator.clone(),
            logs.clone(),
            verdicts.clone(),
            vectors.clone(),
            config.detection.clone(),
        ));
        let engine = Arc::new(BatchClusteringEngine::new(
            stub,
            vectors,
            clusters.clone(),
            verdicts.clone(),
            OutlierSweep::new(validator, logs.clone()),
            config.clustering,
        ));

        let state = AppState {
            pipeline,
            engine,
            logs,
            verdicts,
            clusters,
            guard,
        };

        let router = create_router(ApiConfig::default(), state);
        drop(router);
    }
}
