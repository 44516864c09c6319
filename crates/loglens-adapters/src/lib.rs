//! # Loglens Adapters
//!
//! Thin consumes-from integrations for the external services the
//! orchestrator depends on: the PII redaction engine, the embedding
//! provider, the statistical scoring model, the density clustering
//! backend and the LLM provider.
//!
//! Each adapter is a reqwest-backed implementation of the corresponding
//! `loglens_core::traits` contract. Adapters stay thin: status codes and
//! timeouts map to the core error taxonomy and payloads are converted to
//! core types immediately; no retry or orchestration logic lives here.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod clustering;
pub mod embedding;
pub mod llm;
pub mod redaction;
pub mod scoring;

pub use clustering::HttpClusteringBackend;
pub use embedding::HttpEmbeddingProvider;
pub use llm::HttpLlmClient;
pub use redaction::HttpRedactor;
pub use scoring::HttpScoringBackend;

use std::time::Duration;

use loglens_core::{Error, Result};

/// Default timeout applied to adapter HTTP calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared reqwest client construction for all adapters
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}

/// Normalize a configured base URL
pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
