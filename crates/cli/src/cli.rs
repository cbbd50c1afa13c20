use clap::Parser;

/// Interactive chat that lets a language model call tool providers.
///
/// Providers are launched from the JSON config on first use; every tool
/// call is confirmed in the terminal unless a permission rule says otherwise.
#[derive(Parser, Debug)]
#[command(name = "conduit", about = "Chat with a model that can call tool providers")]
pub struct CliArgs {
    /// Provider configuration file ({"mcpServers": {...}})
    #[arg(long, default_value = "config.json")]
    pub config: String,

    /// Settings file (default: ~/.config/conduit/config.toml)
    #[arg(long)]
    pub settings: Option<String>,

    /// Model name override
    #[arg(long)]
    pub model: Option<String>,

    /// API key (overrides env var and settings file)
    #[arg(long)]
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Directory for images returned by tools
    #[arg(long)]
    pub image_dir: Option<String>,

    /// Maximum follow-up completions per turn
    #[arg(long)]
    pub max_follow_ups: Option<usize>,

    /// Seconds to wait for a provider reply (default: wait forever)
    #[arg(long)]
    pub read_timeout: Option<u64>,

    /// Send the MCP initialize handshake to each provider after launch
    #[arg(long)]
    pub handshake: bool,
}
