use anyhow::Context;
use clap::Parser;
use genui_api::{init_tracing, AppState, Server};
use genui_core::ConfigManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "genui-server", version, about = "Generate and refine web UIs with language models")]
struct Cli {
    /// Configuration file (defaults to ./.genui.toml or ~/.genui/config.toml)
    #[arg(short, long, env = "GENUI_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overriding the configuration
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::load()?,
    };
    let mut config = manager.into_config();
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_address()))?;

    info!(
        provider = %config.provider.name,
        provider_url = %config.provider.url,
        "Starting GenUI"
    );
    let state = AppState::from_config(config).await?;
    Server::new(addr, state).run().await
}
