//! PII redaction engine adapter.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use loglens_core::traits::{RedactionResult, Redactor};
use loglens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{build_client, trim_base_url, DEFAULT_TIMEOUT};

#[derive(Debug, Serialize)]
struct RedactRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct RedactReply {
    text: String,
    #[serde(default)]
    entities: BTreeMap<String, u32>,
}

/// HTTP client for the PII redaction engine
#[derive(Debug, Clone)]
pub struct HttpRedactor {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRedactor {
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
impl Redactor for HttpRedactor {
    #[instrument(skip(self, text))]
    async fn redact(&self, text: &str) -> Result<RedactionResult> {
        let url = format!("{}/v1/redact", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&RedactRequest { text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("redaction request timed out");
                    Error::Redaction("request timed out".into())
                } else {
                    Error::Redaction(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Redaction(format!("status {status}: {body}")));
        }

        let reply: RedactReply = response
            .json()
            .await
            .map_err(|e| Error::Redaction(format!("bad reply body: {e}")))?;

        debug!(entities = reply.entities.len(), "redaction complete");
        Ok(RedactionResult {
            text: reply.text,
            entities: reply.entities,
        })
    }
}
