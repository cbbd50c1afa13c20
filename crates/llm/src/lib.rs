//! HTTP completion backends for the conduit orchestrator.

pub mod openai;

pub use openai::{OpenAiCompletionService, DEFAULT_BASE_URL};
