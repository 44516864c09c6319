//! Density clustering backend adapter.
//!
//! Long-running clustering jobs (seconds to minutes) run behind this
//! endpoint; the adapter uses a wider timeout than the per-event calls.
//! Labels come back as raw integers with `-1` marking outliers.

use std::time::Duration;

use async_trait::async_trait;
use loglens_core::traits::{ClusteringBackend, ClusteringParams};
use loglens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{build_client, trim_base_url};

/// Clustering runs are long; allow minutes rather than seconds
pub const CLUSTERING_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct ClusterRequest<'a> {
    vectors: &'a [Vec<f32>],
    params: &'a ClusteringParams,
}

#[derive(Debug, Deserialize)]
struct ClusterReply {
    labels: Vec<i32>,
}

/// HTTP client for the density clustering backend
#[derive(Debug, Clone)]
pub struct HttpClusteringBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClusteringBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, CLUSTERING_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: trim_base_url(base_url),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl ClusteringBackend for HttpClusteringBackend {
    #[instrument(skip(self, vectors), fields(n = vectors.len()))]
    async fn cluster(&self, vectors: &[Vec<f32>], params: &ClusteringParams) -> Result<Vec<i32>> {
        let url = format!("{}/v1/cluster", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ClusterRequest { vectors, params })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("clustering request timed out");
                    Error::clustering("request timed out")
                } else {
                    Error::clustering(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::clustering(format!("status {status}: {body}")));
        }

        let reply: ClusterReply = response
            .json()
            .await
            .map_err(|e| Error::clustering(format!("bad reply body: {e}")))?;

        if reply.labels.len() != vectors.len() {
            return Err(Error::clustering(format!(
                "backend returned {} labels for {} vectors",
                reply.labels.len(),
                vectors.len()
            )));
        }

        debug!(labels = reply.labels.len(), "clustering labels received");
        Ok(reply.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        assert!(HttpClusteringBackend::new("http://localhost:9400/").is_ok());
    }
}
