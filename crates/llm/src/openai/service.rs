//! [`CompletionService`] implementation for the chat-completions endpoint.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use conduit_tool_runtime::{CompletionError, CompletionRequest, CompletionResponse, CompletionService};

use super::translate::{parse_response, request_body};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Non-streaming chat-completions client with function calling.
pub struct OpenAiCompletionService {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompletionService {
    /// Create a new service.
    ///
    /// # Arguments
    /// * `api_key` - Bearer token; `None` for local servers that need none
    /// * `base_url` - API base URL without the `/v1` suffix (e.g. `"https://api.openai.com"`)
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = request_body(&request);

        debug!(
            model = %request.model,
            url = %url,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body_text = response.text().await.unwrap_or_default();
            if status == 401 {
                return Err(CompletionError::Auth);
            }
            return Err(CompletionError::Api {
                status,
                body: body_text,
            });
        }

        let resp: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
        let parsed = parse_response(&resp)?;
        debug!(
            has_content = parsed.content.is_some(),
            tool_calls = parsed.tool_calls.len(),
            "Chat completion received"
        );
        Ok(parsed)
    }

    fn service_name(&self) -> &str {
        "openai"
    }
}
