use async_trait::async_trait;
use conduit_tool_runtime::{PermissionGate, ToolCall};
use std::sync::Arc;
use tracing::warn;

use crate::terminal::Terminal;

/// Asks the user on the terminal before each tool call.
pub struct TerminalGate {
    terminal: Arc<Terminal>,
}

impl TerminalGate {
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self { terminal }
    }
}

#[async_trait]
impl PermissionGate for TerminalGate {
    async fn authorize(&self, call: &ToolCall) -> bool {
        let terminal = self.terminal.clone();
        let call = call.clone();
        let name = call.name.clone();
        // Stdin reads block; keep them off the runtime's worker threads.
        match tokio::task::spawn_blocking(move || terminal.prompt_permission(&call)).await {
            Ok(Ok(allowed)) => allowed,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Permission prompt failed, rejecting call");
                false
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Permission prompt task failed, rejecting call");
                false
            }
        }
    }
}
