//! Artifact persistence for an index and its identifier table.
//!
//! Layout for a prefix such as `data/catalog`:
//!
//! - `data/catalog.hnsw`: 8-byte magic, 1-byte codec tag, then the
//!   (optionally zstd-compressed) bincode encoding of the index snapshot.
//! - `data/catalog.ids.json`: the identifier table as a JSON list of strings.
//!
//! Each file is written to a temp file in the destination directory, synced
//! and renamed into place, so a failed save never corrupts a previously valid
//! artifact. The snapshot records the table length and digest, which makes an
//! index paired with another build's table detectable at load time.
//!
//! The snapshot holds the vectors and the build config; the HNSW graph is
//! rebuilt from them on load.

use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::ann::{AnnConfig, AnnIndex};
use crate::catalog::IdentifierTable;
use crate::{CompressionCodec, CompressionConfig, IndexError, INDEX_FORMAT_VERSION};

const MAGIC: &[u8; 8] = b"VSHNSW01";
const HEADER_LEN: usize = MAGIC.len() + 1;

/// File locations of an artifact pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub table: PathBuf,
}

impl ArtifactPaths {
    pub fn from_prefix(prefix: impl AsRef<Path>) -> Self {
        Self {
            index: with_suffix(prefix.as_ref(), ".hnsw"),
            table: with_suffix(prefix.as_ref(), ".ids.json"),
        }
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u16,
    dimension: usize,
    config: AnnConfig,
    vectors: &'a [Vec<f32>],
    table_len: usize,
    table_digest: u64,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u16,
    dimension: usize,
    config: AnnConfig,
    vectors: Vec<Vec<f32>>,
    table_len: usize,
    table_digest: u64,
}

/// Write `index` and `table` under `prefix`. Index first, then table.
pub fn save_pair(
    index: &AnnIndex,
    table: &IdentifierTable,
    prefix: impl AsRef<Path>,
    compression: &CompressionConfig,
) -> Result<ArtifactPaths, IndexError> {
    if index.len() != table.len() {
        return Err(IndexError::SizeMismatch {
            index: index.len(),
            table: table.len(),
        });
    }

    let paths = ArtifactPaths::from_prefix(prefix);
    let index_bytes = encode_index(index, table, compression)?;
    let table_bytes =
        serde_json::to_vec(table).map_err(|e| IndexError::Encode(e.to_string()))?;

    write_atomic(&paths.index, &index_bytes)?;
    write_atomic(&paths.table, &table_bytes)?;

    log::info!(
        "saved catalog: {} vectors to {} ({} bytes), table to {}",
        index.len(),
        paths.index.display(),
        index_bytes.len(),
        paths.table.display()
    );
    Ok(paths)
}

/// Read the pair saved under `prefix`.
pub fn load_pair(prefix: impl AsRef<Path>) -> Result<(AnnIndex, IdentifierTable), IndexError> {
    let paths = ArtifactPaths::from_prefix(prefix);
    let index_bytes = read_artifact(&paths.index)?;
    let table_bytes = read_artifact(&paths.table)?;

    let (index, table_len, table_digest) = decode_index(&index_bytes)?;
    let table: IdentifierTable = serde_json::from_slice(&table_bytes)
        .map_err(|e| IndexError::CorruptTable(e.to_string()))?;

    if index.len() != table.len() {
        return Err(IndexError::SizeMismatch {
            index: index.len(),
            table: table.len(),
        });
    }
    if table_len != table.len() || table_digest != table.digest() {
        return Err(IndexError::PairMismatch);
    }

    log::info!(
        "loaded catalog from {}: {} vectors, dim {}",
        paths.index.display(),
        index.len(),
        index.dimension()
    );
    Ok((index, table))
}

pub(crate) fn encode_index(
    index: &AnnIndex,
    table: &IdentifierTable,
    compression: &CompressionConfig,
) -> Result<Vec<u8>, IndexError> {
    let snapshot = SnapshotRef {
        version: INDEX_FORMAT_VERSION,
        dimension: index.dimension(),
        config: *index.config(),
        vectors: index.vectors(),
        table_len: table.len(),
        table_digest: table.digest(),
    };
    let encoded = encode_to_vec(&snapshot, standard())?;
    let payload = compression.compress(&encoded)?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(compression.codec.tag());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode and validate an index artifact. Returns the index with the table
/// length and digest it was saved against.
pub(crate) fn decode_index(bytes: &[u8]) -> Result<(AnnIndex, usize, u64), IndexError> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(IndexError::CorruptIndex("missing index header".into()));
    }
    let codec = CompressionCodec::from_tag(bytes[MAGIC.len()]).ok_or_else(|| {
        IndexError::CorruptIndex(format!("unknown codec tag {}", bytes[MAGIC.len()]))
    })?;

    let encoded = CompressionConfig::decompress(codec, &bytes[HEADER_LEN..])
        .map_err(|e| IndexError::CorruptIndex(format!("decompression failed: {e}")))?;
    let (snapshot, _): (Snapshot, usize) = decode_from_slice(&encoded, standard())
        .map_err(|e| IndexError::CorruptIndex(format!("decode failed: {e}")))?;

    if snapshot.version != INDEX_FORMAT_VERSION {
        return Err(IndexError::CorruptIndex(format!(
            "unsupported format version {}",
            snapshot.version
        )));
    }
    validate_snapshot(&snapshot)?;

    let Snapshot {
        dimension,
        config,
        vectors,
        table_len,
        table_digest,
        ..
    } = snapshot;
    let index = AnnIndex::from_vectors(dimension, vectors, config)
        .map_err(|e| IndexError::CorruptIndex(format!("rebuild failed: {e}")))?;
    Ok((index, table_len, table_digest))
}

fn validate_snapshot(snapshot: &Snapshot) -> Result<(), IndexError> {
    let corrupt = |msg: String| Err(IndexError::CorruptIndex(msg));

    if snapshot.config.validate().is_err() {
        return corrupt(format!("invalid stored config {:?}", snapshot.config));
    }
    if !snapshot.vectors.is_empty() && snapshot.dimension == 0 {
        return corrupt("zero dimension with stored vectors".into());
    }
    if let Some(id) = snapshot
        .vectors
        .iter()
        .position(|v| v.len() != snapshot.dimension)
    {
        return corrupt(format!(
            "vector {id} has {} components, expected {}",
            snapshot.vectors[id].len(),
            snapshot.dimension
        ));
    }
    if let Some(id) = snapshot
        .vectors
        .iter()
        .position(|v| v.iter().any(|x| !x.is_finite()))
    {
        return corrupt(format!("vector {id} has non-finite components"));
    }
    Ok(())
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, IndexError> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => IndexError::NotFound {
            path: path.display().to_string(),
        },
        _ => IndexError::Io(format!("{}: {e}", path.display())),
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IndexError::from(e.error))?;
    Ok(())
}
