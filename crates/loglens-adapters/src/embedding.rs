//! Embedding provider adapter.
//!
//! Calls a metered embedding endpoint and maps transport failures to
//! `Error::EmbeddingUnavailable` so the pipeline can fall back to a
//! fast-tier-only verdict.

use std::time::Duration;

use async_trait::async_trait;
use loglens_core::traits::{EmbeddingProvider, EmbeddingResponse};
use loglens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::{build_client, trim_base_url, DEFAULT_TIMEOUT};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    embedding: Vec<f32>,
    #[serde(default)]
    tokens: u32,
}

/// HTTP client for the embedding provider
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Self::with_timeout(base_url, api_key, model, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url: trim_base_url(base_url),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                input: text,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("embedding request timed out");
                    Error::EmbeddingUnavailable("request timed out".into())
                } else {
                    Error::EmbeddingUnavailable(e.to_string())
                }
            })?;

        match response.status().as_u16() {
            200 => {
                let reply: EmbedReply = response
                    .json()
                    .await
                    .map_err(|e| Error::EmbeddingUnavailable(format!("bad reply body: {e}")))?;
                debug!(dims = reply.embedding.len(), tokens = reply.tokens, "embedding received");
                Ok(EmbeddingResponse {
                    vector: reply.embedding,
                    tokens: reply.tokens,
                })
            }
            429 => {
                warn!("embedding provider rate limited");
                Err(Error::EmbeddingUnavailable("rate limited".into()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                error!(status, body = %body, "embedding provider error");
                Err(Error::EmbeddingUnavailable(format!("status {status}: {body}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let provider =
            HttpEmbeddingProvider::new("http://localhost:9100/", "key", "text-embedding-3-small");
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().base_url, "http://localhost:9100");
    }
}
