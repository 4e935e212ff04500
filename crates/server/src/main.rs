//! safenest-sw entry point.
//!
//! Boots one coordinator over the configured cache database and serves its
//! lifecycle events as MCP tools on stdio. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use safenest_client::{Coordinator, FetchClient, FetchConfig, WorkerConfig};
use safenest_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(origin = %config.origin, db_path = %config.db_path.display(), "Starting safenest-sw on stdio transport");

    let cache = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open cache at {}", config.db_path.display()))?;
    let network = FetchClient::new(FetchConfig::from(&config))?;
    let worker = WorkerConfig::from_app_config(&config)?;
    let coordinator = Coordinator::new(worker, cache, Arc::new(network));

    let handler = handler::SafeNestServer::new(Arc::new(coordinator));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
