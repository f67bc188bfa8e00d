//! imgbridge MCP Server
//!
//! Model Context Protocol server for re-hosting images
//! Run with: IMGBRIDGE_UPLOAD_URL=https://host/upload imgbridge-mcp

use anyhow::Context;
use imgbridge_mcp::{ImgBridgeService, RelayConfig, TransferPipeline};
use rmcp::service::ServiceExt;
use rmcp::transport::io::stdio;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the MCP transport; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = RelayConfig::from_env()
        .context("Failed to load configuration. Set the IMGBRIDGE_UPLOAD_URL environment variable")?;

    tracing::info!(
        upload_url = %config.upload_url,
        transport = ?config.transport,
        encoder = ?config.encoder,
        "Starting imgbridge MCP server"
    );

    let pipeline =
        TransferPipeline::from_config(config).context("Failed to initialize transfer pipeline")?;

    let service = ImgBridgeService::new(pipeline);
    let running = service.serve(stdio()).await.context("MCP transport failed")?;
    running.waiting().await.context("MCP server error")?;

    Ok(())
}
