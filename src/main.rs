use std::sync::Arc;

use anyhow::Context;
use loki_mcp::config::{load_dotenv, Config, ServerMode};
use loki_mcp::http::{serve_http, serve_with_stdio};
use loki_mcp::mcp::run_stdio;
use loki_mcp::tools::LokiTools;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_problem = load_dotenv();
    let config = Config::from_env()?;

    // stdout carries the stdio transport, so logs go to stderr.
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(e) = dotenv_problem {
        warn!(error = %e, "could not load .env, using process environment only");
    }

    info!(loki_url = %config.loki_url, mode = ?config.server.mode, "starting loki mcp server");
    let tools = Arc::new(LokiTools::from_config(&config).context("building backend client")?);

    match config.server.mode {
        ServerMode::Stdio => run_stdio(tools).await?,
        ServerMode::Http => serve_http(tools, &config.server).await?,
        ServerMode::Both => {
            serve_with_stdio(serve_http(tools.clone(), &config.server), run_stdio(tools)).await?
        }
    }

    info!("loki mcp server stopped");
    Ok(())
}
