//! LLM provider adapter.
//!
//! Speaks a chat-completions style wire format and returns the raw reply
//! body; parsing into a tagged variant happens at the validator boundary,
//! never here.

use std::time::Duration;

use async_trait::async_trait;
use loglens_core::traits::{LlmClient, LlmRequest};
use loglens_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::{build_client, trim_base_url};

/// LLM calls get a wider timeout than embeddings
pub const LLM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// HTTP client for the LLM provider
#[derive(Debug, Clone)]
pub struct HttpLlmClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Self::with_timeout(base_url, api_key, model, LLM_TIMEOUT)
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
impl LlmClient for HttpLlmClient {
    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model,
            "messages": [
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": 0.2,
        });
        if request.json_response {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("LLM request timed out");
                    Error::llm("request timed out")
                } else {
                    Error::llm(e.to_string())
                }
            })?;

        match response.status().as_u16() {
            200 => {
                let reply: ChatReply = response
                    .json()
                    .await
                    .map_err(|e| Error::llm(format!("bad reply body: {e}")))?;
                let content = reply
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| Error::llm("reply contained no choices"))?;
                debug!(chars = content.len(), "LLM reply received");
                Ok(content)
            }
            429 => {
                warn!("LLM provider rate limited");
                Err(Error::llm("rate limited"))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::llm(format!("status {status}: {body}")))
            }
        }
    }
}
