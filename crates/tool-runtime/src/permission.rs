use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::tool::ToolCall;

/// Permission level for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// Tool executes without asking the user
    #[serde(rename = "auto", alias = "auto_approve")]
    AutoApprove,
    /// User must confirm before execution
    #[serde(rename = "confirm", alias = "require_confirmation")]
    RequireConfirmation,
    /// Tool is blocked from executing
    #[serde(rename = "deny")]
    Deny,
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "auto_approve" => Ok(Self::AutoApprove),
            "confirm" | "require_confirmation" => Ok(Self::RequireConfirmation),
            "deny" => Ok(Self::Deny),
            other => Err(format!(
                "unknown permission level '{}' (expected auto, confirm or deny)",
                other
            )),
        }
    }
}

/// Maps tool names to permission levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionPolicy {
    /// Explicit per-tool permissions
    pub rules: HashMap<String, PermissionLevel>,
    /// Default permission for tools not in the rules map
    pub default: PermissionLevel,
}

impl PermissionPolicy {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            default: PermissionLevel::RequireConfirmation,
        }
    }

    pub fn with_rule(mut self, pattern: impl Into<String>, level: PermissionLevel) -> Self {
        self.rules.insert(pattern.into(), level);
        self
    }

    /// Get the permission level for a given tool name.
    /// Checks exact match first, then the longest matching `prefix*` pattern,
    /// then default.
    pub fn level_for(&self, tool_name: &str) -> PermissionLevel {
        if let Some(&level) = self.rules.get(tool_name) {
            return level;
        }
        self.rules
            .iter()
            .filter_map(|(pattern, &level)| {
                let prefix = pattern.strip_suffix('*')?;
                tool_name.starts_with(prefix).then_some((prefix.len(), level))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, level)| level)
            .unwrap_or(self.default)
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// The checkpoint every tool call passes before it reaches a provider.
///
/// `authorize` may block for as long as the user takes to decide. A `false`
/// answer means the call must not be executed.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn authorize(&self, call: &ToolCall) -> bool;
}

/// Approves everything. For non-interactive embedding and tests.
pub struct AllowAll;

#[async_trait]
impl PermissionGate for AllowAll {
    async fn authorize(&self, _call: &ToolCall) -> bool {
        true
    }
}

/// Rejects everything.
pub struct DenyAll;

#[async_trait]
impl PermissionGate for DenyAll {
    async fn authorize(&self, _call: &ToolCall) -> bool {
        false
    }
}

/// Applies a policy and defers `RequireConfirmation` tools to another gate
/// (usually the interactive prompt).
pub struct PolicyGate {
    policy: PermissionPolicy,
    confirm: Arc<dyn PermissionGate>,
}

impl PolicyGate {
    pub fn new(policy: PermissionPolicy, confirm: Arc<dyn PermissionGate>) -> Self {
        Self { policy, confirm }
    }

    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }
}

#[async_trait]
impl PermissionGate for PolicyGate {
    async fn authorize(&self, call: &ToolCall) -> bool {
        match self.policy.level_for(&call.name) {
            PermissionLevel::AutoApprove => {
                tracing::debug!(tool = %call.name, "Tool call auto-approved by policy");
                true
            }
            PermissionLevel::Deny => {
                tracing::info!(tool = %call.name, "Tool call denied by policy");
                false
            }
            PermissionLevel::RequireConfirmation => self.confirm.authorize(call).await,
        }
    }
}
