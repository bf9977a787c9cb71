use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use agent_chat::config::{AppDirs, ChatConfig, FileConfig, load_config};

#[derive(Parser)]
#[command(name = "agent-chat")]
#[command(about = "Chat with remote agents from the terminal")]
struct Cli {
    /// Agent server base URL (overrides config.toml and AGENT_CHAT_SERVER__URL)
    #[arg(long)]
    server_url: Option<String>,

    /// Custom data directory (defaults to ~/.agent_chat)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    use std::io::IsTerminal;

    let cli = Cli::parse();

    let dirs = AppDirs::new(cli.data_dir.clone())?;
    init_logging(&dirs, cli.debug)?;

    let mut file_config: FileConfig = load_config(&dirs.data_dir)
        .extract()
        .with_context(|| format!("Invalid configuration in {}", dirs.config_toml_path().display()))?;
    if let Some(url) = cli.server_url {
        file_config.server.url = url;
    }
    let config = ChatConfig::from_file(&file_config)?;

    if !std::io::stdin().is_terminal() {
        anyhow::bail!("agent-chat needs an interactive terminal");
    }

    agent_chat::tui::run(config)
}

/// The TUI owns stdout, so logs go to `{data_dir}/logs/agent-chat.log`.
fn init_logging(dirs: &AppDirs, debug: bool) -> Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dirs.log_path())
        .with_context(|| format!("Failed to open log file {}", dirs.log_path().display()))?;

    let default_directive = if debug {
        "agent_chat=debug,info"
    } else {
        "agent_chat=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(log_file))
                .with_ansi(false),
        )
        .with(env_filter)
        .init();
    Ok(())
}
