mod cli;
mod config;
mod gate;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use conduit_llm::OpenAiCompletionService;
use conduit_mcp::ProcessManager;
use conduit_tool_runtime::{ImageStore, Orchestrator, PolicyGate, ResultAdapter};

use crate::cli::CliArgs;
use crate::config::{load_servers, CliConfig};
use crate::gate::TerminalGate;
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let terminal = Arc::new(Terminal::new());

    // Load settings and provider config
    let settings = CliConfig::load(args.settings.as_deref())
        .context("failed to load settings")?;
    let servers = load_servers(Path::new(&args.config))?;
    info!(providers = servers.mcp_servers.len(), "Loaded provider config");

    let model = args.model.clone().unwrap_or_else(|| settings.model.clone());
    let api_key = settings.resolve_api_key(args.api_key.as_deref());
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| settings.api_base_url.clone());
    let image_dir = args
        .image_dir
        .clone()
        .unwrap_or_else(|| settings.image_dir.clone());
    let read_timeout = args
        .read_timeout
        .map(Duration::from_secs)
        .or_else(|| settings.read_timeout());
    let max_follow_ups = args.max_follow_ups.unwrap_or(settings.max_follow_ups);

    if api_key.is_none() {
        terminal.print_warning("No API key configured; requests are sent unauthenticated")?;
    }

    let processes = ProcessManager::new(servers.mcp_servers)
        .with_read_timeout(read_timeout)
        .with_shutdown_grace(settings.shutdown_grace())
        .with_handshake(args.handshake || settings.handshake);

    let gate = PolicyGate::new(
        settings.permission_policy(),
        Arc::new(TerminalGate::new(terminal.clone())),
    );

    let mut orchestrator = Orchestrator::new(
        model.clone(),
        Arc::new(OpenAiCompletionService::new(api_key, base_url)),
        Arc::new(gate),
        processes,
        ResultAdapter::new(ImageStore::new(&image_dir)),
    )
    .with_observer(terminal.clone())
    .with_max_follow_ups(max_follow_ups);

    terminal.print_info("Discovering tools...")?;
    let catalog = orchestrator.discover_tools().await;
    if catalog.is_empty() {
        terminal.print_warning("No tools discovered from any provider. Exiting.")?;
        orchestrator.shutdown().await;
        return Ok(());
    }
    let tool_names: Vec<&str> = catalog.definitions().iter().map(|d| d.name.as_str()).collect();
    terminal.print_banner(&model, &tool_names)?;
    terminal.print_info(&format!("Images will be saved to: {}", image_dir))?;

    // REPL loop
    loop {
        let input = match terminal.read_input() {
            Ok(Some(text)) => text,
            Ok(None) => {
                terminal.print_info("Goodbye.")?;
                break;
            }
            Err(e) => {
                error!(error = %e, "Failed to read input");
                break;
            }
        };

        if input.is_empty() {
            continue;
        }

        if let Err(e) = orchestrator.run_turn(&input).await {
            error!(error = %e, "Turn failed");
            terminal.print_error(&format!("{:#}", e))?;
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
