//! Offline catalog build: gather product images, embed them, build the HNSW
//! index and persist it with its identifier table.
//!
//! Per-image failures (unreadable file, failed download, undecodable image)
//! are logged and recorded in the [`BuildReport`]; the build only fails when
//! nothing could be embedded.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use embed::Embedder;
use index::{recall_at_k, AnnConfig, AnnIndex, Catalog, IdentifierTable, IndexError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of catalog vectors re-queried to estimate recall@10.
pub const DEFAULT_RECALL_SAMPLE: usize = 100;

/// Default per-request timeout for URL sources.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

const RECALL_K: usize = 10;

/// Errors that abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot read image directory {path}: {source}")]
    ReadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid url manifest {path}: {reason}")]
    Manifest { path: String, reason: String },
    #[error("http client setup failed: {0}")]
    Http(String),
    #[error("no images could be embedded ({attempted} attempted)")]
    NoEmbeddings { attempted: usize },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("failed to write build report: {0}")]
    Report(String),
}

/// Raw bytes of one catalog image and the identifier it is indexed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub product_id: String,
    pub bytes: Vec<u8>,
}

/// One entry of a URL manifest: `[{"url": "...", "product_id": "..."}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    pub url: String,
    pub product_id: String,
}

/// An image left out of the catalog and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedImage {
    pub product_id: String,
    pub reason: String,
}

/// Summary of a build, printed by the CLI and saved next to the artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Images the source listed, including ones that failed to load.
    pub source_images: usize,
    pub embedded: usize,
    pub skipped: Vec<SkippedImage>,
    pub dimension: usize,
    pub model_name: String,
    pub ann: AnnConfig,
    pub elapsed_ms: u64,
    /// HNSW recall@10 against exhaustive search over a sample of the catalog.
    pub recall_at_10: Option<f32>,
}

impl BuildReport {
    /// Fold failures from the loading stage into the report.
    pub fn with_load_failures(mut self, failures: Vec<SkippedImage>) -> Self {
        self.source_images += failures.len();
        let mut skipped = failures;
        skipped.append(&mut self.skipped);
        self.skipped = skipped;
        self
    }

    /// Write the report as pretty JSON to `<prefix>.report.json`.
    pub fn write(&self, prefix: impl AsRef<Path>) -> Result<(), BuildError> {
        let path = report_path(prefix.as_ref());
        let json =
            serde_json::to_vec_pretty(self).map_err(|e| BuildError::Report(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| BuildError::Report(e.to_string()))?;
        }
        fs::write(&path, json).map_err(|e| BuildError::Report(e.to_string()))
    }
}

pub fn report_path(prefix: &Path) -> std::path::PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".report.json");
    name.into()
}

/// Load every regular file in `dir`, sorted by file name. The identifier is
/// the file name without its extension.
pub fn load_local_dir(
    dir: impl AsRef<Path>,
) -> Result<(Vec<SourceImage>, Vec<SkippedImage>), BuildError> {
    let dir = dir.as_ref();
    let read_dir_err = |source| BuildError::ReadDir {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut images = Vec::with_capacity(paths.len());
    let mut skipped = Vec::new();
    for path in paths {
        let Some(product_id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        match fs::read(&path) {
            Ok(bytes) => images.push(SourceImage { product_id, bytes }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                skipped.push(SkippedImage {
                    product_id,
                    reason: format!("read failed: {e}"),
                });
            }
        }
    }

    tracing::info!(dir = %dir.display(), loaded = images.len(), "loaded local images");
    Ok((images, skipped))
}

/// Parse a JSON list of `{url, product_id}` objects.
pub fn load_url_manifest(path: impl AsRef<Path>) -> Result<Vec<UrlEntry>, BuildError> {
    let path = path.as_ref();
    let manifest_err = |reason: String| BuildError::Manifest {
        path: path.display().to_string(),
        reason,
    };
    let content = fs::read(path).map_err(|e| manifest_err(e.to_string()))?;
    serde_json::from_slice(&content).map_err(|e| manifest_err(e.to_string()))
}

/// Download each manifest entry in order. Transport errors and non-2xx
/// responses are logged and reported as skipped.
pub async fn fetch_url_images(
    entries: &[UrlEntry],
    timeout: Duration,
) -> Result<(Vec<SourceImage>, Vec<SkippedImage>), BuildError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BuildError::Http(e.to_string()))?;

    let mut images = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for entry in entries {
        match fetch_one(&client, &entry.url).await {
            Ok(bytes) => images.push(SourceImage {
                product_id: entry.product_id.clone(),
                bytes,
            }),
            Err(e) => {
                tracing::warn!(url = %entry.url, error = %e, "skipping image download");
                skipped.push(SkippedImage {
                    product_id: entry.product_id.clone(),
                    reason: format!("download failed: {e}"),
                });
            }
        }
    }

    tracing::info!(
        requested = entries.len(),
        fetched = images.len(),
        "downloaded url images"
    );
    Ok((images, skipped))
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// Embed `images` and build a catalog over the successes, estimating recall
/// on [`DEFAULT_RECALL_SAMPLE`] vectors.
pub fn build_catalog(
    images: &[SourceImage],
    embedder: &dyn Embedder,
    config: AnnConfig,
) -> Result<(Catalog, BuildReport), BuildError> {
    build_catalog_with(images, embedder, config, DEFAULT_RECALL_SAMPLE)
}

/// Like [`build_catalog`], with an explicit recall sample size (0 skips the
/// estimate).
pub fn build_catalog_with(
    images: &[SourceImage],
    embedder: &dyn Embedder,
    config: AnnConfig,
    recall_sample: usize,
) -> Result<(Catalog, BuildReport), BuildError> {
    let started = Instant::now();

    // Parallel map over an indexed iterator keeps input order.
    let results: Vec<_> = images
        .par_iter()
        .map(|image| embedder.embed(&image.bytes))
        .collect();

    let mut vectors = Vec::with_capacity(images.len());
    let mut ids = Vec::with_capacity(images.len());
    let mut skipped = Vec::new();
    for (image, result) in images.iter().zip(results) {
        match result {
            Ok(embedding) => {
                vectors.push(embedding.into_vector());
                ids.push(image.product_id.clone());
            }
            Err(e) => {
                tracing::warn!(product_id = %image.product_id, error = %e, "skipping image");
                skipped.push(SkippedImage {
                    product_id: image.product_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if vectors.is_empty() {
        return Err(BuildError::NoEmbeddings {
            attempted: images.len(),
        });
    }

    let index = AnnIndex::build(&vectors, config)?;
    let recall_at_10 = estimate_recall(&index, &vectors, recall_sample)?;
    let catalog = Catalog::new(index, IdentifierTable::new(ids))?;

    let report = BuildReport {
        source_images: images.len(),
        embedded: catalog.len(),
        skipped,
        dimension: catalog.index().dimension(),
        model_name: embedder.model_name().to_string(),
        ann: config,
        elapsed_ms: started.elapsed().as_millis() as u64,
        recall_at_10,
    };
    tracing::info!(
        embedded = report.embedded,
        skipped = report.skipped.len(),
        dimension = report.dimension,
        elapsed_ms = report.elapsed_ms,
        "built catalog"
    );
    Ok((catalog, report))
}

/// Query the index with an evenly spaced sample of its own vectors.
fn estimate_recall(
    index: &AnnIndex,
    vectors: &[Vec<f32>],
    sample: usize,
) -> Result<Option<f32>, IndexError> {
    if sample == 0 {
        return Ok(None);
    }
    let step = vectors.len().div_ceil(sample).max(1);
    let queries: Vec<Vec<f32>> = vectors.iter().step_by(step).cloned().collect();
    let k = RECALL_K.min(index.len());
    recall_at_k(index, &queries, k).map(Some)
}
