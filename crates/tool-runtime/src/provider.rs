use crate::conversation::ConversationMessage;
use crate::tool::{FunctionTool, RequestedToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How the model may use the attached tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

/// One completion request: full history plus the tool catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ConversationMessage>,
    pub tools: Vec<FunctionTool>,
    pub tool_choice: ToolChoice,
}

/// The assistant message a completion returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<RequestedToolCall>,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<RequestedToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    /// Text content, ignoring empty strings.
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}

/// A model completion backend.
///
/// This trait lives in tool-runtime (not in crates/llm) because it's
/// defined by the consumer (the orchestrator), not the backend.
/// Implementations live in crates/llm.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError>;

    /// Backend name for logging (e.g., "openai", "mock")
    fn service_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Authentication failed")]
    Auth,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Scripted completion service for testing the orchestrator without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns queued responses in order and records every request.
    /// With nothing queued it answers with an empty message.
    pub struct MockCompletionService {
        responses: Mutex<VecDeque<Result<CompletionResponse, CompletionError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockCompletionService {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn queue_response(&self, response: CompletionResponse) {
            self.responses.lock().unwrap().push_back(Ok(response));
        }

        pub fn queue_text(&self, text: &str) {
            self.queue_response(CompletionResponse::text(text));
        }

        /// Queue a response requesting `(id, name, arguments)` calls.
        pub fn queue_tool_calls(&self, calls: &[(&str, &str, &str)]) {
            self.queue_response(CompletionResponse::tool_calls(
                calls
                    .iter()
                    .map(|(id, name, args)| RequestedToolCall::new(*id, *name, *args))
                    .collect(),
            ));
        }

        pub fn queue_error(&self, error: CompletionError) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }
    }

    impl Default for MockCompletionService {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CompletionService for MockCompletionService {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionResponse::default()))
        }

        fn service_name(&self) -> &str {
            "mock"
        }
    }
}
