//! aula worker host entry point.
//!
//! Loads configuration, opens the partition store, registers the worker
//! script and serves the MCP tools on stdio. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use aula_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod runtime;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db = %config.db_path.display(),
        origin = %config.origin,
        "Starting aula worker host on stdio transport"
    );

    let runtime = Arc::new(runtime::Runtime::open(config).await?);

    // The host keeps serving from the network when registration fails.
    match runtime.register().await {
        Ok(outcome) => tracing::info!(?outcome, "worker registered"),
        Err(err) => tracing::error!(error = %err, "worker registration failed"),
    }

    let handler = handler::AulaServer::new(runtime);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
