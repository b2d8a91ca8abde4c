//! vsearch Server - HTTP query service for image-similarity search
//!
//! This crate loads a catalog (HNSW index + identifier table) built offline by
//! `vsearch-build` and answers query-by-image requests against it.
//!
//! # Features
//!
//! - **Visual search**: multipart image upload, embedding and top-k search run
//!   off the async workers under a per-query timeout
//! - **Catalog lifecycle**: explicit load at startup, hot reload on request;
//!   in-flight queries keep the snapshot they started with
//! - **Middleware**: Compression, CORS, request ID tracking, structured logging
//! - **Configuration**: Environment variable and file-based configuration
//! - **Error Handling**: Explicit error codes per failure class
//! - **Graceful Shutdown**: Proper signal handling for production deployments
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check
//! - `GET /metrics` - Prometheus metrics
//! - `POST /api/v1/visual-search?top_k=5` - Query by image (multipart `file`);
//!   also served at `POST /visual-search/`
//! - `GET /api/v1/catalog/stats` - Catalog statistics
//! - `POST /api/v1/catalog/reload` - Reload the artifact pair from disk

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
