use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::telemetry::RecorderMetrics;
use chrono::{DateTime, Utc};
use embed::{Embedder, PixelEmbedder};
use index::Catalog;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::{Arc, RwLock};
use vsearch::VisualSearch;

/// Shared application state
///
/// The loaded catalog sits behind an `Arc` that is cloned out for each query,
/// so a reload swaps in a new catalog without disturbing in-flight requests.
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    embedder: Arc<dyn Embedder>,

    search: RwLock<Arc<VisualSearch>>,

    loaded_at: RwLock<DateTime<Utc>>,

    prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    /// Load the catalog at `config.catalog_prefix` with the configured embedder.
    pub fn load(config: ServerConfig) -> ServerResult<Self> {
        let embedder = PixelEmbedder::new(config.embed.clone())
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let catalog = Catalog::load(&config.catalog_prefix)?;
        Self::new(config, Arc::new(embedder), catalog)
    }

    /// Assemble state from an already loaded catalog.
    pub fn new(
        config: ServerConfig,
        embedder: Arc<dyn Embedder>,
        catalog: Catalog,
    ) -> ServerResult<Self> {
        let search = build_search(&config, embedder.clone(), catalog)?;
        tracing::info!(
            size = search.len(),
            dimension = search.index().dimension(),
            model = embedder.model_name(),
            "catalog loaded"
        );

        Ok(Self {
            config: Arc::new(config),
            embedder,
            search: RwLock::new(Arc::new(search)),
            loaded_at: RwLock::new(Utc::now()),
            prometheus: None,
        })
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Snapshot of the current catalog.
    pub fn search(&self) -> Arc<VisualSearch> {
        self.search
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-read the artifact pair from `catalog_prefix` and swap it in. On
    /// failure the current catalog stays in service. Returns the new snapshot.
    pub fn reload(&self) -> ServerResult<Arc<VisualSearch>> {
        let catalog = Catalog::load(&self.config.catalog_prefix)?;
        let fresh = Arc::new(build_search(&self.config, self.embedder.clone(), catalog)?);

        let previous = std::mem::replace(
            &mut *self
                .search
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            fresh.clone(),
        );
        *self
            .loaded_at
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Utc::now();

        tracing::info!(
            previous_size = previous.len(),
            size = fresh.len(),
            prefix = %self.config.catalog_prefix,
            "catalog reloaded"
        );
        Ok(fresh)
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        *self
            .loaded_at
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn prometheus(&self) -> Option<&PrometheusHandle> {
        self.prometheus.as_ref()
    }
}

fn build_search(
    config: &ServerConfig,
    embedder: Arc<dyn Embedder>,
    catalog: Catalog,
) -> ServerResult<VisualSearch> {
    // An empty catalog answers every query with no hits, whatever its dimension.
    if !catalog.is_empty() && catalog.index().dimension() != embedder.dimension() {
        return Err(ServerError::Config(format!(
            "catalog dimension {} does not match embedder {} dimension {}",
            catalog.index().dimension(),
            embedder.model_name(),
            embedder.dimension()
        )));
    }

    let search = VisualSearch::from_catalog(catalog, embedder);
    Ok(if config.metrics_enabled {
        search.with_metrics(Arc::new(RecorderMetrics))
    } else {
        search
    })
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
}
