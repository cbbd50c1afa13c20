//! Provider configuration types.
//!
//! The configuration file itself is read by the caller; this module only
//! defines its shape:
//!
//! ```json
//! {"mcpServers": {"calc": {"command": "calc-server", "args": [], "env": {"KEY": "v"}}}}
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How to launch one tool provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides layered over the parent environment.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Top-level provider configuration document. Keeps file order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: IndexMap<String, ProviderConfig>,
}

impl ServersConfig {
    /// Parse a configuration document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_servers_config() {
        let config = ServersConfig::from_json(
            r#"{"mcpServers": {
                "calc": {"command": "calc-server", "args": []},
                "browser": {"command": "npx", "args": ["-y", "browser-mcp"], "env": {"HEADLESS": "1"}}
            }}"#,
        )
        .unwrap();

        let ids: Vec<&str> = config.mcp_servers.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["calc", "browser"]);
        assert_eq!(config.mcp_servers["calc"], ProviderConfig::new("calc-server", vec![]));
        assert_eq!(config.mcp_servers["browser"].env["HEADLESS"], "1");
    }

    #[test]
    fn test_missing_servers_section() {
        let config = ServersConfig::from_json("{}").unwrap();
        assert!(config.mcp_servers.is_empty());
    }

    #[test]
    fn test_args_default_to_empty() {
        let config = ServersConfig::from_json(r#"{"mcpServers": {"x": {"command": "x"}}}"#).unwrap();
        assert!(config.mcp_servers["x"].args.is_empty());
    }
}
