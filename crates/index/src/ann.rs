//! Approximate Nearest Neighbor (ANN) search using the HNSW algorithm.
//!
//! This module wraps a Hierarchical Navigable Small World graph from
//! `hnsw_rs` over a batch of embedding vectors and answers k-nearest-neighbor
//! queries against it. It offers sub-linear search time (~O(log n)) compared
//! to a brute force O(n·D) scan, at the price of a small, tunable recall loss.
//!
//! ## Trade-offs
//!
//! - **Speed**: ~100-1000x faster than linear scan for large catalogs
//! - **Recall**: Typically 95-99% (some false negatives possible)
//! - **Memory**: Graph links on top of the raw vectors
//! - **Build time**: Grows with `m` and `ef_construction`
//!
//! ## When NOT to Use
//!
//! - Catalogs below [`AnnConfig::min_vectors_for_ann`] are answered by an
//!   exact scan; the graph is not even built.
//!
//! ## Distance
//!
//! Hits carry squared Euclidean (L2²) distances recomputed from the stored
//! vectors. For unit-norm embeddings this is `2 - 2·cos`, so ordering by
//! distance is ordering by cosine similarity.
//!
//! ## Ordering
//!
//! Hits are sorted by `(distance, id)` with `f32::total_cmp`, so ties resolve
//! to the lower id and a built index answers the same query with the same
//! hits every time. Graph construction inserts in parallel, so two builds of
//! the same vectors may pick different neighbors.

use std::cmp::Ordering;
use std::fmt;

use hashbrown::HashSet;
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::IndexError;

/// Upper bound on graph layers accepted by `hnsw_rs`.
const MAX_LAYERS: usize = 16;

/// Largest neighbor count `hnsw_rs` supports per node.
const MAX_M: usize = 256;

/// Below this many vectors the graph is never built.
const MIN_GRAPH_VECTORS: usize = 10;

/// Configuration for HNSW construction and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnConfig {
    /// Number of neighbors per node (layer 0 allows `2 * m`).
    /// Higher = better recall, more memory, slower build.
    /// Default: 32
    pub m: usize,
    /// Size of the dynamic candidate list during construction.
    /// Default: 200
    pub ef_construction: usize,
    /// Size of the dynamic candidate list during search. The effective beam
    /// is `max(ef_search, k)`.
    /// Default: 64
    pub ef_search: usize,
    /// Whether to use ANN or fall back to linear scan.
    /// Default: true
    pub enabled: bool,
    /// Minimum number of vectors before ANN is used.
    /// Below this threshold, linear scan is used even if enabled=true.
    /// Default: 1000
    pub min_vectors_for_ann: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construction: 200,
            ef_search: 64,
            enabled: true,
            min_vectors_for_ann: 1000,
        }
    }
}

impl AnnConfig {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    /// Check if ANN should be used given the current dataset size.
    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann.max(MIN_GRAPH_VECTORS)
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if !(2..=MAX_M).contains(&self.m) {
            return Err(IndexError::InvalidConfig(format!(
                "m must be at least 2 and at most {MAX_M}, got {}",
                self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(IndexError::InvalidConfig(
                "ef_construction must be at least 1".into(),
            ));
        }
        if self.ef_search == 0 {
            return Err(IndexError::InvalidConfig(
                "ef_search must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    /// Internal id: the vector's position in build order.
    pub id: usize,
    /// Squared Euclidean distance to the query (lower = closer).
    pub distance: f32,
}

fn by_distance_then_id(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.id.cmp(&b.id))
}

/// HNSW index over fixed-dimension `f32` vectors.
///
/// Built once from a batch ([`AnnIndex::build`]) and read-only afterwards;
/// concurrent queries through `&AnnIndex` need no locking.
pub struct AnnIndex {
    config: AnnConfig,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    hnsw: Option<Hnsw<'static, f32, DistL2>>,
}

impl fmt::Debug for AnnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnIndex")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .field("len", &self.vectors.len())
            .field("graph", &self.hnsw.is_some())
            .finish()
    }
}

impl AnnIndex {
    /// Create an empty index of the given dimension.
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            vectors: Vec::new(),
            hnsw: None,
        }
    }

    /// Build an index over `vectors`. Vector `i` gets internal id `i`.
    ///
    /// The dimension is fixed by the first vector; any other length fails
    /// with [`IndexError::DimensionMismatch`] before the graph is touched.
    pub fn build(vectors: &[Vec<f32>], config: AnnConfig) -> Result<Self, IndexError> {
        let dimension = vectors.first().ok_or(IndexError::EmptyInput)?.len();
        Self::from_vectors(dimension, vectors.to_vec(), config)
    }

    /// Validate owned vectors against `dimension` and build the graph.
    pub(crate) fn from_vectors(
        dimension: usize,
        vectors: Vec<Vec<f32>>,
        config: AnnConfig,
    ) -> Result<Self, IndexError> {
        config.validate()?;
        if vectors.is_empty() {
            return Ok(Self::new(dimension, config));
        }
        if dimension == 0 {
            return Err(IndexError::InvalidConfig(
                "vectors must have at least one component".into(),
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                got: bad.len(),
            });
        }

        let hnsw = build_graph(&vectors, &config);
        let index = Self {
            config,
            dimension,
            vectors,
            hnsw,
        };

        log::debug!(
            "built ann index: {} vectors, dim {}, graph {}, top layer {}, m {}, ef_construction {}",
            index.len(),
            dimension,
            index.has_graph(),
            index.max_layer(),
            config.m,
            config.ef_construction
        );
        Ok(index)
    }

    /// Approximate k-nearest-neighbor search.
    ///
    /// Returns exactly `min(k, len())` hits in ascending `(distance, id)`
    /// order; `k > len()` is clamped, never padded. The graph is asked for a
    /// beam of `max(ef_search, k)` candidates; if it yields fewer than that
    /// beam could hold (duplicate vectors can leave nodes unreachable), the
    /// query is answered by an exact scan instead.
    ///
    /// For `k1 <= k2 <= ef_search` the beam is the same, so `search(q, k1)`
    /// is a prefix of `search(q, k2)`. Past `ef_search` the beam widens with
    /// `k` and may surface neighbors a narrower beam missed.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_query(query, k)?;
        let k = k.min(self.len());

        let Some(hnsw) = self.hnsw.as_ref() else {
            return Ok(self.exact(query, k));
        };

        let ef = self.config.ef_search.max(k);
        let mut hits: Vec<SearchHit> = hnsw
            .search(query, ef, ef)
            .into_iter()
            .map(|neighbour| neighbour.get_origin_id())
            .filter(|&id| id < self.len())
            .map(|id| self.hit(query, id))
            .collect();
        hits.sort_unstable_by(by_distance_then_id);
        hits.dedup_by_key(|hit| hit.id);

        if hits.len() < ef.min(self.len()) {
            log::debug!(
                "hnsw beam returned {} of {} candidates, using exact scan",
                hits.len(),
                ef.min(self.len())
            );
            return Ok(self.exact(query, k));
        }

        hits.truncate(k);
        Ok(hits)
    }

    /// Exhaustive search with the same validation and ordering as
    /// [`search`](Self::search). Used to measure recall.
    pub fn search_exact(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_query(query, k)?;
        Ok(self.exact(query, k.min(self.len())))
    }

    /// Number of vectors in the index.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &AnnConfig {
        &self.config
    }

    /// Whether queries go through the HNSW graph rather than a linear scan.
    pub fn has_graph(&self) -> bool {
        self.hnsw.is_some()
    }

    /// Highest layer reached in the graph (0 without a graph).
    pub fn max_layer(&self) -> usize {
        self.hnsw
            .as_ref()
            .map(|hnsw| hnsw.get_max_level_observed() as usize)
            .unwrap_or(0)
    }

    /// Stored vector for an internal id.
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    pub(crate) fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    fn check_query(&self, query: &[f32], k: usize) -> Result<(), IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        if self.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        Ok(())
    }

    fn exact(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut all: Vec<SearchHit> = (0..self.len()).map(|id| self.hit(query, id)).collect();
        all.sort_unstable_by(by_distance_then_id);
        all.truncate(k);
        all
    }

    fn hit(&self, query: &[f32], id: usize) -> SearchHit {
        SearchHit {
            id,
            distance: l2_squared(query, &self.vectors[id]),
        }
    }
}

fn build_graph(vectors: &[Vec<f32>], config: &AnnConfig) -> Option<Hnsw<'static, f32, DistL2>> {
    let nb_elem = vectors.len();
    if !config.should_use_ann(nb_elem) {
        return None;
    }

    let nb_layer = MAX_LAYERS.min((nb_elem as f32).ln().trunc() as usize).max(1);
    let hnsw = Hnsw::<f32, DistL2>::new(
        config.m,
        nb_elem,
        nb_layer,
        config.ef_construction,
        DistL2 {},
    );

    let data_for_insertion: Vec<(&Vec<f32>, usize)> = vectors
        .iter()
        .enumerate()
        .map(|(id, vector)| (vector, id))
        .collect();
    hnsw.parallel_insert(&data_for_insertion);
    Some(hnsw)
}

/// Squared Euclidean distance.
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Mean fraction of the exact top-`k` that the HNSW search also returns,
/// over `queries`. Returns 1.0 when there are no queries.
pub fn recall_at_k(index: &AnnIndex, queries: &[Vec<f32>], k: usize) -> Result<f32, IndexError> {
    if queries.is_empty() {
        return Ok(1.0);
    }

    let mut total = 0.0f32;
    for query in queries {
        let exact = index.search_exact(query, k)?;
        let approx: HashSet<usize> = index.search(query, k)?.iter().map(|h| h.id).collect();
        let found = exact.iter().filter(|h| approx.contains(&h.id)).count();
        total += found as f32 / exact.len() as f32;
    }
    Ok(total / queries.len() as f32)
}
