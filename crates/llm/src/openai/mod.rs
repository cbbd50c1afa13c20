//! OpenAI-compatible chat-completions implementation of [`CompletionService`].
//!
//! Works against any server that speaks `/v1/chat/completions` with function
//! calling (OpenAI, LiteLLM proxies, Ollama, vLLM, ...).
//!
//! [`CompletionService`]: conduit_tool_runtime::CompletionService

mod service;
mod translate;

pub use self::service::{OpenAiCompletionService, DEFAULT_BASE_URL};
