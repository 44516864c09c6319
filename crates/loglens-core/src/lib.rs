//! # Loglens Core
//!
//! Shared foundation for the loglens hybrid anomaly detection system.
//!
//! This crate provides:
//! - Domain types (log records, verdicts, cluster assignments)
//! - Error taxonomy and the crate-wide `Result` alias
//! - Configuration with environment overrides
//! - The daily spending budget guard for metered provider calls
//! - The content-addressed embedding cache
//! - Contracts for the external collaborators (redaction, embedding,
//!   scoring, clustering, LLM)

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::budget::{BudgetDecision, BudgetGuard, BudgetStats, CostModel};
    pub use crate::cache::{CachedEmbedding, EmbeddingCache};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::traits::{
        ClusteringBackend, ClusteringParams, EmbeddingProvider, LlmClient, LlmRequest, Redactor,
        ScoringBackend,
    };
    pub use crate::types::{
        ClusterAssignment, ClusterLabel, ClusterMetadata, DetectionMethod, DetectionVerdict,
        FastVerdict, FeatureVector, LogLevel, LogRecord, RedactedLog, RunSummary, Severity,
        ValidationOutcome, VerdictTier,
    };
}
