//! Tool-provider plumbing for conduit.
//!
//! Tool providers are external processes that speak JSON-RPC 2.0, one
//! envelope per line, over their standard streams.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **transport**: the `McpTransport` trait and the line-framed transport
//! - **config**: provider launch configuration
//! - **process**: provider process lifecycle (`ProcessManager`)
//! - **error**: unified error type
//!
//! # Usage
//!
//! ```no_run
//! use conduit_mcp::{ProcessManager, ServersConfig};
//!
//! # async fn example() -> Result<(), conduit_mcp::McpError> {
//! let config = ServersConfig::from_json(r#"{"mcpServers": {"calc": {"command": "calc-server"}}}"#)?;
//! let mut manager = ProcessManager::new(config.mcp_servers);
//! let tools = manager.acquire("calc").await?.list_tools().await?;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod types;
pub mod transport;
pub mod config;
pub mod process;
pub mod error;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use types::*;
pub use transport::{LineTransport, McpTransport};
pub use config::{ProviderConfig, ServersConfig};
pub use process::{ProcessManager, ProviderProcess, DEFAULT_SHUTDOWN_GRACE};
pub use error::McpError;
