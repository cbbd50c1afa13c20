use anyhow::{Context, Result};
use conduit_mcp::ServersConfig;
use conduit_tool_runtime::{PermissionLevel, PermissionPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// CLI settings loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Model name sent with every completion request
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI-compatible base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// API key, used when neither the flag nor the env var is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Directory for images returned by tools
    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    /// Maximum follow-up completions per turn
    #[serde(default = "default_max_follow_ups")]
    pub max_follow_ups: usize,

    /// Seconds to wait for a provider reply; absent means wait forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,

    /// Seconds providers get to exit at shutdown before being killed
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Send the MCP initialize handshake after launching a provider
    #[serde(default)]
    pub handshake: bool,

    /// Tool permission overrides (tool name or prefix* -> "auto" | "confirm" | "deny")
    #[serde(default)]
    pub tool_permissions: HashMap<String, String>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_base_url() -> String {
    conduit_llm::DEFAULT_BASE_URL.to_string()
}

fn default_image_dir() -> String {
    "data/images".to_string()
}

fn default_max_follow_ups() -> usize {
    conduit_tool_runtime::DEFAULT_MAX_FOLLOW_UPS
}

fn default_shutdown_grace_secs() -> u64 {
    conduit_mcp::DEFAULT_SHUTDOWN_GRACE.as_secs()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base_url: default_api_base_url(),
            api_key: None,
            image_dir: default_image_dir(),
            max_follow_ups: default_max_follow_ups(),
            read_timeout_secs: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            handshake: false,
            tool_permissions: HashMap::new(),
        }
    }
}

/// Environment variables checked for an API key, in order.
const API_KEY_VARS: [&str; 2] = ["OPENAI_API_KEY", "LLM_API_KEY"];

impl CliConfig {
    /// Return the default config directory path: ~/.config/conduit/
    pub fn default_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("conduit");
        Ok(config_dir)
    }

    /// Return the default config file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            debug!(?config_path, "Loading settings");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read settings: {}", config_path.display()))?;
            let config: Self = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", config_path.display()))?;
            Ok(config)
        } else {
            debug!(?config_path, "Settings file not found, using defaults");
            let config = Self::default();
            // Create directory and write default config
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let toml_str = toml::to_string_pretty(&config)
                .context("failed to serialize default settings")?;
            std::fs::write(&config_path, toml_str).ok();
            Ok(config)
        }
    }

    /// Resolve the API key.
    /// Priority: cli_override > env var > config file.
    pub fn resolve_api_key(&self, cli_override: Option<&str>) -> Option<String> {
        self.resolve_api_key_with(cli_override, |var| std::env::var(var).ok())
    }

    fn resolve_api_key_with(
        &self,
        cli_override: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        if let Some(key) = cli_override {
            return Some(key.to_string());
        }
        API_KEY_VARS
            .iter()
            .filter_map(|var| env(var))
            .find(|key| !key.is_empty())
            .or_else(|| self.api_key.clone().filter(|key| !key.is_empty()))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Build the permission policy from `tool_permissions`.
    /// Unknown levels fall back to confirmation.
    pub fn permission_policy(&self) -> PermissionPolicy {
        let mut policy = PermissionPolicy::new();
        for (tool_name, level_str) in &self.tool_permissions {
            let level = level_str.parse::<PermissionLevel>().unwrap_or_else(|e| {
                warn!(
                    tool = %tool_name,
                    level = %level_str,
                    error = %e,
                    "Unknown permission level, defaulting to RequireConfirmation"
                );
                PermissionLevel::RequireConfirmation
            });
            policy.rules.insert(tool_name.clone(), level);
        }
        policy
    }
}

/// Read the provider configuration file.
pub fn load_servers(path: &Path) -> Result<ServersConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read provider config: {}", path.display()))?;
    ServersConfig::from_json(&content)
        .with_context(|| format!("failed to parse provider config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.image_dir, "data/images");
        assert_eq!(config.max_follow_ups, 16);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert!(config.read_timeout().is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
model = "llama3.2"
read_timeout_secs = 30

[tool_permissions]
"browser_*" = "auto"
"delete_file" = "deny"
"#,
        )
        .unwrap();
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.api_base_url, "https://api.openai.com");

        let policy = config.permission_policy();
        assert_eq!(policy.level_for("browser_click"), PermissionLevel::AutoApprove);
        assert_eq!(policy.level_for("delete_file"), PermissionLevel::Deny);
        assert_eq!(policy.level_for("add"), PermissionLevel::RequireConfirmation);
    }

    #[test]
    fn test_unknown_permission_level_requires_confirmation() {
        let mut config = CliConfig::default();
        config
            .tool_permissions
            .insert("add".to_string(), "maybe".to_string());
        assert_eq!(
            config.permission_policy().level_for("add"),
            PermissionLevel::RequireConfirmation
        );
    }

    #[test]
    fn test_resolve_api_key_precedence() {
        let mut config = CliConfig::default();
        config.api_key = Some("from-file".to_string());

        let no_env = |_: &str| None;
        let llm_env = |var: &str| (var == "LLM_API_KEY").then(|| "from-env".to_string());

        assert_eq!(
            config.resolve_api_key_with(Some("from-flag"), llm_env),
            Some("from-flag".to_string())
        );
        assert_eq!(
            config.resolve_api_key_with(None, llm_env),
            Some("from-env".to_string())
        );
        assert_eq!(
            config.resolve_api_key_with(None, no_env),
            Some("from-file".to_string())
        );
        config.api_key = None;
        assert_eq!(config.resolve_api_key_with(None, no_env), None);
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = CliConfig::load(path.to_str()).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert!(path.exists());

        let reloaded = CliConfig::load(path.to_str()).unwrap();
        assert_eq!(reloaded.max_follow_ups, config.max_follow_ups);
    }

    #[test]
    fn test_load_servers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"mcpServers": {"calc": {"command": "calc-server", "args": []}, "web": {"command": "npx", "args": ["web"]}}}"#,
        )
        .unwrap();
        let servers = load_servers(&path).unwrap();
        let ids: Vec<&String> = servers.mcp_servers.keys().collect();
        assert_eq!(ids, vec!["calc", "web"]);

        let missing = load_servers(&dir.path().join("absent.json")).unwrap_err();
        assert!(format!("{:#}", missing).contains("failed to read provider config"));
    }
}
