//! Fast scorer adapter (tier 1).
//!
//! Wraps the statistical scoring backend, clamping its raw score into
//! [0, 1]. Any backend failure surfaces as `ScorerUnavailable`, which the
//! pipeline maps to "skip fast tier, do not escalate" — failing safe
//! rather than failing open into expensive LLM calls.

use std::sync::Arc;

use loglens_core::traits::ScoringBackend;
use loglens_core::types::{FastVerdict, FeatureVector};
use loglens_core::{Error, Result};
use tracing::debug;

/// Statistical model adapter
#[derive(Clone)]
pub struct FastScorer {
    backend: Arc<dyn ScoringBackend>,
}

impl std::fmt::Debug for FastScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastScorer").finish()
    }
}

impl FastScorer {
    pub fn new(backend: Arc<dyn ScoringBackend>) -> Self {
        Self { backend }
    }

    /// Score a feature vector; deterministic given identical inputs and
    /// model state
    pub async fn score(&self, features: &FeatureVector) -> Result<FastVerdict> {
        let raw = self.backend.score(features).await.map_err(|e| match e {
            Error::ScorerUnavailable(_) => e,
            other => Error::ScorerUnavailable(other.to_string()),
        })?;

        let score = if raw.score.is_finite() {
            raw.score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        debug!(raw = raw.score, clamped = score, is_anomaly = raw.is_anomaly, "fast tier scored");

        Ok(FastVerdict {
            score,
            is_anomaly: raw.is_anomaly,
        })
    }
}
