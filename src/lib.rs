//! Workspace umbrella crate for vsearch, an image-similarity search engine.
//!
//! This crate stitches the embedder, the HNSW index and the identifier table
//! into a single query path ([`VisualSearch::handle_query`]) and hosts the
//! offline pipeline that builds and persists a catalog ([`build`]).

pub mod build;
pub mod config;

pub use embed::{EmbedConfig, EmbedError, Embedder, Embedding, PixelEmbedder};
pub use index::{
    AnnConfig, AnnIndex, Catalog, IdentifierTable, IndexError, ProductRef, SearchHit,
};

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors that can occur while answering a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    /// `top_k` must be at least 1.
    InvalidTopK { requested: usize },
    /// The query bytes could not be turned into an embedding.
    Embedding(EmbedError),
    /// The index rejected the query vector.
    Index(IndexError),
}

impl SearchError {
    /// True when the caller sent something unusable, as opposed to a fault in
    /// the loaded catalog.
    pub fn is_client_error(&self) -> bool {
        match self {
            SearchError::InvalidTopK { .. } | SearchError::Embedding(_) => true,
            SearchError::Index(_) => false,
        }
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::InvalidTopK { requested } => {
                write!(f, "top_k must be at least 1, got {requested}")
            }
            SearchError::Embedding(err) => write!(f, "embedding failure: {err}"),
            SearchError::Index(err) => write!(f, "index search failure: {err}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SearchError::Embedding(err) => Some(err),
            SearchError::Index(err) => Some(err),
            SearchError::InvalidTopK { .. } => None,
        }
    }
}

impl From<EmbedError> for SearchError {
    fn from(value: EmbedError) -> Self {
        SearchError::Embedding(value)
    }
}

impl From<IndexError> for SearchError {
    fn from(value: IndexError) -> Self {
        SearchError::Index(value)
    }
}

/// One ranked match returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Position of the matched vector in the index.
    pub internal_id: usize,
    pub external_product_id: String,
    pub display_name: String,
    /// Squared Euclidean distance to the query (lower = more similar).
    pub distance: f32,
}

/// Metrics observer for the query stages.
pub trait QueryMetrics: Send + Sync {
    fn record_embed(&self, latency: Duration, result: Result<(), EmbedError>);
    /// `Ok` carries the number of hits returned by the index.
    fn record_search(&self, latency: Duration, result: Result<usize, IndexError>);
}

struct MetricsSpan<'a> {
    recorder: &'a dyn QueryMetrics,
    start: Instant,
}

impl<'a> MetricsSpan<'a> {
    fn start(recorder: Option<&'a Arc<dyn QueryMetrics>>) -> Option<Self> {
        recorder.map(|recorder| Self {
            recorder: recorder.as_ref(),
            start: Instant::now(),
        })
    }

    fn record_embed(self, result: Result<(), EmbedError>) {
        self.recorder.record_embed(self.start.elapsed(), result);
    }

    fn record_search(self, result: Result<usize, IndexError>) {
        self.recorder.record_search(self.start.elapsed(), result);
    }
}

/// Query orchestrator over one loaded catalog.
///
/// Holds the index and identifier table behind `Arc`s and never mutates them,
/// so one instance serves any number of concurrent queries. Swapping in a new
/// catalog means constructing a new `VisualSearch`.
#[derive(Clone)]
pub struct VisualSearch {
    index: Arc<AnnIndex>,
    table: Arc<IdentifierTable>,
    embedder: Arc<dyn Embedder>,
    metrics: Option<Arc<dyn QueryMetrics>>,
}

impl fmt::Debug for VisualSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualSearch")
            .field("size", &self.index.len())
            .field("dimension", &self.index.dimension())
            .field("table_len", &self.table.len())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl VisualSearch {
    /// Assemble an orchestrator from already loaded parts. The pair is used as
    /// given; prefer [`VisualSearch::from_catalog`], which guarantees alignment.
    pub fn new(
        index: Arc<AnnIndex>,
        table: Arc<IdentifierTable>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        if index.len() != table.len() {
            tracing::warn!(
                index = index.len(),
                table = table.len(),
                "index and identifier table sizes differ"
            );
        }
        Self {
            index,
            table,
            embedder,
            metrics: None,
        }
    }

    pub fn from_catalog(catalog: Catalog, embedder: Arc<dyn Embedder>) -> Self {
        let (index, table) = catalog.into_parts();
        Self::new(Arc::new(index), Arc::new(table), embedder)
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn QueryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn index(&self) -> &AnnIndex {
        &self.index
    }

    pub fn table(&self) -> &IdentifierTable {
        &self.table
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Number of products in the catalog.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Embed `image_bytes` and return up to `requested_k` matches, closest
    /// first. `requested_k` above the catalog size is clamped; an empty catalog
    /// yields an empty list.
    pub fn handle_query(
        &self,
        image_bytes: &[u8],
        requested_k: usize,
    ) -> Result<Vec<QueryHit>, SearchError> {
        if requested_k == 0 {
            return Err(SearchError::InvalidTopK {
                requested: requested_k,
            });
        }

        let span = MetricsSpan::start(self.metrics.as_ref());
        let embedding = match self.embedder.embed(image_bytes) {
            Ok(embedding) => {
                if let Some(span) = span {
                    span.record_embed(Ok(()));
                }
                embedding
            }
            Err(err) => {
                if let Some(span) = span {
                    span.record_embed(Err(err.clone()));
                }
                return Err(SearchError::Embedding(err));
            }
        };

        let effective_k = requested_k.min(self.table.len());
        if effective_k == 0 {
            tracing::debug!("query against empty catalog");
            return Ok(Vec::new());
        }

        let span = MetricsSpan::start(self.metrics.as_ref());
        let hits = match self.index.search(&embedding.vector, effective_k) {
            Ok(hits) => {
                if let Some(span) = span {
                    span.record_search(Ok(hits.len()));
                }
                hits
            }
            Err(err) => {
                if let Some(span) = span {
                    span.record_search(Err(err.clone()));
                }
                return Err(SearchError::Index(err));
            }
        };

        Ok(self.resolve(&hits))
    }

    /// Map index hits to product identifiers, dropping ids the table does not
    /// cover.
    fn resolve(&self, hits: &[SearchHit]) -> Vec<QueryHit> {
        hits.iter()
            .filter_map(|hit| {
                let Some(raw) = self.table.get(hit.id) else {
                    tracing::warn!(
                        internal_id = hit.id,
                        table_len = self.table.len(),
                        "search hit outside identifier table, skipping"
                    );
                    return None;
                };
                let product = ProductRef::parse(raw);
                Some(QueryHit {
                    internal_id: hit.id,
                    external_product_id: product.external_id().to_string(),
                    display_name: product.display_name().to_string(),
                    distance: hit.distance,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Reads the query bytes as little-endian f32s.
    struct RawEmbedder {
        dim: usize,
    }

    impl Embedder for RawEmbedder {
        fn model_name(&self) -> &str {
            "raw-f32"
        }

        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed(&self, image_bytes: &[u8]) -> Result<Embedding, EmbedError> {
            if image_bytes.is_empty() {
                return Err(EmbedError::EmptyInput);
            }
            if image_bytes.len() % 4 != 0 {
                return Err(EmbedError::Decode("truncated vector".into()));
            }
            let vector: Vec<f32> = image_bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            Ok(Embedding {
                embedding_dim: vector.len(),
                vector,
                model_name: "raw-f32".into(),
                normalized: true,
            })
        }
    }

    fn encode(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|x| x.to_le_bytes()).collect()
    }

    fn service(vectors: &[Vec<f32>], ids: &[&str]) -> VisualSearch {
        let index = AnnIndex::build(vectors, AnnConfig::default()).unwrap();
        let table: IdentifierTable = ids.iter().map(|s| s.to_string()).collect();
        let catalog = Catalog::new(index, table).unwrap();
        VisualSearch::from_catalog(catalog, Arc::new(RawEmbedder { dim: 2 }))
    }

    #[derive(Default)]
    struct CountingMetrics {
        events: Mutex<Vec<&'static str>>,
    }

    impl CountingMetrics {
        fn snapshot(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    impl QueryMetrics for CountingMetrics {
        fn record_embed(&self, _latency: Duration, result: Result<(), EmbedError>) {
            let label = if result.is_ok() { "embed_ok" } else { "embed_err" };
            self.events.lock().unwrap().push(label);
        }

        fn record_search(&self, _latency: Duration, result: Result<usize, IndexError>) {
            let label = if result.is_ok() { "search_ok" } else { "search_err" };
            self.events.lock().unwrap().push(label);
        }
    }

    #[test]
    fn zero_k_rejected_before_embedding() {
        let metrics = Arc::new(CountingMetrics::default());
        let svc = service(&[vec![1.0, 0.0]], &["1_a"]).with_metrics(metrics.clone());

        let err = svc.handle_query(b"not even a vector!", 0).unwrap_err();
        assert_eq!(err, SearchError::InvalidTopK { requested: 0 });
        assert!(err.is_client_error());
        assert!(metrics.snapshot().is_empty());
    }

    #[test]
    fn embedding_failure_is_client_error() {
        let svc = service(&[vec![1.0, 0.0]], &["1_a"]);
        let err = svc.handle_query(&[1, 2, 3], 1).unwrap_err();
        assert!(matches!(err, SearchError::Embedding(EmbedError::Decode(_))));
        assert!(err.is_client_error());
    }

    #[test]
    fn dimension_mismatch_is_server_error() {
        let svc = service(&[vec![1.0, 0.0]], &["1_a"]);
        let err = svc.handle_query(&encode(&[1.0, 0.0, 0.0]), 1).unwrap_err();
        assert_eq!(
            err,
            SearchError::Index(IndexError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        );
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn resolves_structured_and_opaque_ids() {
        let svc = service(&[vec![1.0, 0.0], vec![0.0, 1.0]], &["12_red_shoe", "widget"]);

        let hits = svc.handle_query(&encode(&[0.0, 1.0]), 2).unwrap();
        assert_eq!(hits[0].internal_id, 1);
        assert_eq!(hits[0].external_product_id, "widget");
        assert_eq!(hits[0].display_name, "widget");
        assert_eq!(hits[1].external_product_id, "12");
        assert_eq!(hits[1].display_name, "red_shoe");
    }

    #[test]
    fn out_of_table_hits_are_skipped() {
        let index = AnnIndex::build(
            &[vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]],
            AnnConfig::default(),
        )
        .unwrap();
        let table = IdentifierTable::new(vec!["1_a".into(), "2_b".into()]);
        let svc = VisualSearch::new(
            Arc::new(index),
            Arc::new(table),
            Arc::new(RawEmbedder { dim: 2 }),
        );

        // Clamped to the table size, then id 2 (closest) is dropped.
        let hits = svc.handle_query(&encode(&[-1.0, 0.0]), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|h| h.internal_id < 2));
    }

    #[test]
    fn metrics_record_both_stages() {
        let metrics = Arc::new(CountingMetrics::default());
        let svc = service(&[vec![1.0, 0.0]], &["1_a"]).with_metrics(metrics.clone());

        svc.handle_query(&encode(&[1.0, 0.0]), 3).unwrap();
        svc.handle_query(&[], 3).unwrap_err();
        assert_eq!(metrics.snapshot(), vec!["embed_ok", "search_ok", "embed_err"]);
    }

    #[test]
    fn search_error_sources() {
        let err: SearchError = EmbedError::EmptyInput.into();
        assert!(err.source().is_some());
        let err: SearchError = IndexError::EmptyIndex.into();
        assert!(err.source().is_some());
        assert!(SearchError::InvalidTopK { requested: 0 }.source().is_none());
    }
}
