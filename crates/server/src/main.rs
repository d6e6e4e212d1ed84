use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

mod api;
mod config;

use config::{AppState, ServerConfig, TransportKind};

#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(about = "Tool server speaking MCP over stdio or streamable HTTP", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "toolgate.toml", env = "TOOLGATE_CONFIG")]
    config: PathBuf,

    /// Transport to serve (default: stdio when input is piped, otherwise http)
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Base directory for the file tools
    #[arg(short, long)]
    root: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(transport) = self.transport {
            config.transport = Some(transport);
        }
        if let Some(host) = self.host {
            config.http.host = host;
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(root) = self.root {
            config.tools.root = root;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout is reserved for the stdio protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolgate=info,tower_http=debug".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = ServerConfig::load(&args.config)?;
    args.apply(&mut config);

    let transport = config.resolve_transport(std::io::stdin().is_terminal());
    tracing::info!("Starting Toolgate ({:?} transport)", transport);
    tracing::info!("Tool root: {}", config.tools.root.display());

    let state = AppState::new(&config)?;

    match transport {
        TransportKind::Http => {
            api::serve(&config.http_addr(), state, shutdown_signal()).await?;
        }
        TransportKind::Stdio => {
            let mcp = state.mcp.clone();
            tokio::select! {
                result = mcp.serve_stdio() => result.context("stdio transport failed")?,
                _ = shutdown_signal() => tracing::info!("Interrupted"),
            }
            mcp.shutdown().await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
