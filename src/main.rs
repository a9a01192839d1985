mod answer;
mod config;
mod embedding;
mod error;
mod handlers;
mod index;
mod llm;
mod loader;
mod mcp;
mod session;
mod snapshot;
mod splitter;
mod vector_db;

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use mcp::server::McpServer;

/// Load .env files from multiple locations with priority order:
/// 1. Current working directory (project-specific config)
/// 2. XDG config directory ~/.config/repo-chat/.env (global default config)
///
/// Environment variables set directly in the shell always take highest priority.
fn load_env_files() {
    let cwd_env = std::env::current_dir().map(|p| p.join(".env")).ok();
    if let Some(path) = cwd_env {
        if path.exists() && dotenv::from_path(&path).is_ok() {
            tracing::debug!("Loaded .env from: {}", path.display());
            return;
        }
    }

    if let Some(config_dir) = get_xdg_config_dir() {
        let xdg_env = config_dir.join("repo-chat").join(".env");
        if xdg_env.exists() && dotenv::from_path(&xdg_env).is_ok() {
            tracing::debug!("Loaded .env from: {}", xdg_env.display());
            return;
        }
    }

    tracing::debug!("No .env file found, using environment variables only");
}

/// Get XDG config directory, fallback to ~/.config
fn get_xdg_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load first so RUST_LOG may come from a .env file
    load_env_files();

    // Logs go to stderr; stdout carries the protocol. Default to "error"
    // unless RUST_LOG says otherwise (e.g., RUST_LOG=repo_chat=info).
    let env_filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("error"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        "Starting repo-chat MCP server (workspace {})",
        config.workspace_dir.display()
    );

    let server = McpServer::new(&config)?;
    server.start().await?;

    Ok(())
}
