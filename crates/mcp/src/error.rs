//! Error types for the MCP crate.

use std::time::Duration;

use crate::types::JsonRpcError;

/// Errors that can occur while launching or talking to a tool provider.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// No configuration exists for the requested provider identifier.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider process could not be started.
    #[error("Failed to launch provider '{provider}': {source}")]
    ProviderLaunch {
        provider: String,
        #[source]
        source: std::io::Error,
    },

    /// The provider closed its output stream instead of replying.
    #[error("No response from provider (output stream closed)")]
    NoResponse,

    /// The reply line was not a JSON-RPC response envelope.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The provider replied with an error envelope.
    #[error("Remote tool error: {0}")]
    RemoteToolError(JsonRpcError),

    /// No reply line arrived within the configured read timeout.
    #[error("Timed out after {0:?} waiting for provider response")]
    Timeout(Duration),

    /// Transport I/O error.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Failed to encode or decode JSON.
    #[error("JSON error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl McpError {
    /// Whether the failure happened before any exchange with the provider.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, McpError::UnknownProvider(_) | McpError::ProviderLaunch { .. })
    }
}
