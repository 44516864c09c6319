//! Contracts for the external collaborators the orchestrator consumes.
//!
//! The statistical model, clustering library, PII engine, embedding and
//! LLM providers are black boxes behind these traits; reqwest-backed
//! implementations live in `loglens-adapters`, in-memory fakes in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::FeatureVector;

/// PII redaction engine
#[async_trait]
pub trait Redactor: Send + Sync {
    /// Replace PII in `text`, returning the clean text and per-entity counts
    async fn redact(&self, text: &str) -> Result<RedactionResult>;
}

/// Output of a redaction call
#[derive(Debug, Clone)]
pub struct RedactionResult {
    pub text: String,
    pub entities: BTreeMap<String, u32>,
}

/// Metered embedding provider
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse>;
}

/// Embedding vector plus the token usage the provider billed
#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub vector: Vec<f32>,
    pub tokens: u32,
}

/// Statistical anomaly model (tier 1)
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Score a feature vector; the raw score need not be normalized
    async fn score(&self, features: &FeatureVector) -> Result<RawScore>;
}

/// Raw scorer output before the adapter clamps it into [0, 1]
#[derive(Debug, Clone, Copy)]
pub struct RawScore {
    pub score: f64,
    pub is_anomaly: bool,
}

/// Density clustering parameters forwarded to the backend
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClusteringParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub cluster_selection_epsilon: f64,
}

/// Density clustering library
#[async_trait]
pub trait ClusteringBackend: Send + Sync {
    /// Label each input vector; `-1` marks an outlier. The returned vector
    /// must be the same length as the input.
    async fn cluster(&self, vectors: &[Vec<f32>], params: &ClusteringParams) -> Result<Vec<i32>>;
}

/// A single LLM call
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    /// Ask the provider to return a JSON object body
    pub json_response: bool,
}

/// LLM provider; replies are raw bodies parsed immediately at the
/// validator boundary
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String>;
}
