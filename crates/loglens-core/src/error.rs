//! Error taxonomy for the loglens system.
//!
//! Per-log failures are absorbed into degraded verdicts by the pipeline;
//! only infrastructure failures (storage, clustering backend unreachable)
//! surface to callers as run-level errors.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes the orchestrator distinguishes
#[derive(Debug, Error)]
pub enum Error {
    /// PII redaction engine failed; non-fatal, the pipeline proceeds with
    /// the raw text and flags the verdict as degraded
    #[error("redaction failed: {0}")]
    Redaction(String),

    /// Embedding could not be produced (budget rejection or provider error)
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Statistical scorer unreachable; the fast tier is skipped and the
    /// log is never escalated
    #[error("fast scorer unavailable: {0}")]
    ScorerUnavailable(String),

    /// LLM provider call failed
    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    /// LLM reply did not match the expected structure
    #[error("unparseable LLM response: {0}")]
    UnparseableResponse(String),

    /// Density clustering backend failed; the batch run aborts atomically
    #[error("clustering failed: {0}")]
    ClusteringFailure(String),

    /// Designed rejection path, not a fault: the daily ceiling would be
    /// exceeded by the attempted call
    #[error("daily budget exceeded: ${spent:.6} spent of ${limit:.2} limit")]
    BudgetExceeded { spent: f64, limit: f64 },

    /// A batch run was cancelled before committing
    #[error("run cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence layer failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an LLM provider error
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::LlmProvider(msg.into())
    }

    /// Create an unparseable-response error
    pub fn unparseable(msg: impl Into<String>) -> Self {
        Self::UnparseableResponse(msg.into())
    }

    /// Create a clustering failure
    pub fn clustering(msg: impl Into<String>) -> Self {
        Self::ClusteringFailure(msg.into())
    }

    /// True for failures the validator folds into the explanation-only path
    pub fn is_validation_fallback(&self) -> bool {
        matches!(
            self,
            Self::LlmProvider(_) | Self::UnparseableResponse(_) | Self::BudgetExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exceeded_display() {
        let err = Error::BudgetExceeded {
            spent: 9.5,
            limit: 10.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("9.5"));
        assert!(msg.contains("10.00"));
    }

    #[test]
    fn fallback_classification() {
        assert!(Error::llm("timeout").is_validation_fallback());
        assert!(Error::unparseable("not json").is_validation_fallback());
        assert!(!Error::storage("down").is_validation_fallback());
    }
}
