//! vsearch Server - HTTP query service for image-similarity search
//!
//! Serves the catalog built by `vsearch-build` over a small REST API.

use server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    server::start_server(config).await?;
    Ok(())
}
