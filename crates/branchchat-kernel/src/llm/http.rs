//! HTTP completion service.
//!
//! POSTs `{messages, max_tokens}` as JSON to a fixed endpoint and reads the
//! reply from `content[0].text` of the JSON response.

use async_trait::async_trait;
use serde::Deserialize;

use super::{CompletionRequest, CompletionService, LlmError, LlmResult};

/// Header carrying the API key, when one is configured.
const API_KEY_HEADER: &str = "x-api-key";

/// Completion service backed by a JSON-over-HTTP endpoint.
pub struct HttpCompletionService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpCompletionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionService")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpCompletionService {
    /// Create a service posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    /// Send `x-api-key` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    content: Vec<ReplyBlock>,
}

#[derive(Debug, Deserialize)]
struct ReplyBlock {
    text: Option<String>,
}

/// Pull the reply text out of a response body.
fn extract_text(body: &str) -> LlmResult<String> {
    let reply: ReplyBody =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    reply
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| LlmError::InvalidResponse("missing content[0].text".into()))
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    fn name(&self) -> &str {
        "http"
    }

    #[tracing::instrument(skip(self, request), fields(endpoint = %self.endpoint, turns = request.messages.len()), name = "llm.complete")]
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        extract_text(&body)
    }
}
