//! Statistical scoring model adapter (tier 1).
//!
//! The model itself (IsolationForest or similar) runs behind a scoring
//! endpoint; any failure surfaces as `ScorerUnavailable`, which the
//! pipeline treats as "skip fast tier, do not escalate".

use std::time::Duration;

use async_trait::async_trait;
use loglens_core::traits::{RawScore, ScoringBackend};
use loglens_core::types::FeatureVector;
use loglens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{build_client, trim_base_url, DEFAULT_TIMEOUT};

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    embedding: &'a [f32],
    level: &'a str,
    service: Option<&'a str>,
    hour_bucket: u8,
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    score: f64,
    is_anomaly: bool,
}

/// HTTP client for the statistical scoring backend
#[derive(Debug, Clone)]
pub struct HttpScoringBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpScoringBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: trim_base_url(base_url),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl ScoringBackend for HttpScoringBackend {
    #[instrument(skip(self, features))]
    async fn score(&self, features: &FeatureVector) -> Result<RawScore> {
        let url = format!("{}/v1/score", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ScoreRequest {
                embedding: &features.embedding,
                level: features.level.as_str(),
                service: features.service.as_deref(),
                hour_bucket: features.hour_bucket,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("scorer request timed out");
                    Error::ScorerUnavailable("request timed out".into())
                } else {
                    Error::ScorerUnavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(Error::ScorerUnavailable(format!("status {status}")));
        }

        let reply: ScoreReply = response
            .json()
            .await
            .map_err(|e| Error::ScorerUnavailable(format!("bad reply body: {e}")))?;

        debug!(score = reply.score, is_anomaly = reply.is_anomaly, "fast score received");
        Ok(RawScore {
            score: reply.score,
            is_anomaly: reply.is_anomaly,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        assert!(HttpScoringBackend::new("http://localhost:9300").is_ok());
    }
}
