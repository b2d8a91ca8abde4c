//! # vsearch Index
//!
//! This crate holds the retrieval core of vsearch: an HNSW approximate
//! nearest-neighbor index over image embeddings, the identifier table that
//! maps internal ids to product identifiers, and the persistence layer that
//! writes and reads the two as a matched pair.
//!
//! ## Core Features
//!
//! - **HNSW search**: [`AnnIndex`] is built once from a batch of vectors and
//!   answers top-k queries by squared Euclidean distance, with deterministic
//!   `(distance, id)` ordering.
//! - **Identifier table**: [`IdentifierTable`] is aligned by position with the
//!   index. Entries shaped like `<digits>_<name>` decompose into a
//!   [`ProductRef::Structured`]; anything else stays [`ProductRef::Opaque`].
//! - **Paired artifacts**: [`Catalog`] owns an index and its table and is the
//!   only way to save or load them. Each artifact is written to a temp file and
//!   atomically renamed, and the index records a digest of its table so a pair
//!   from two different builds is rejected at load.
//!
//! ## Example Usage
//!
//! ```
//! use index::{AnnConfig, AnnIndex, Catalog, IdentifierTable};
//!
//! let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
//! let index = AnnIndex::build(&vectors, AnnConfig::default()).unwrap();
//! let table = IdentifierTable::new(vec!["1_apple".into(), "2_banana".into()]);
//! let catalog = Catalog::new(index, table).unwrap();
//!
//! let hits = catalog.index().search(&[0.9, 0.1], 1).unwrap();
//! assert_eq!(catalog.table().get(hits[0].id), Some("1_apple"));
//! ```

pub mod ann;
pub mod catalog;
pub mod persist;

pub use ann::{l2_squared, recall_at_k, AnnConfig, AnnIndex, SearchHit};
pub use catalog::{Catalog, IdentifierTable, ProductRef};
pub use persist::{load_pair, save_pair, ArtifactPaths};

use bincode::error::EncodeError;
use thiserror::Error;
use zstd::{decode_all, encode_all};

/// Bump this value whenever the on-disk index snapshot layout changes.
pub const INDEX_FORMAT_VERSION: u16 = 2;

/// Compression codec options for the index artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    /// No compression (useful for debugging).
    None,
    /// Zstd compression (default, good balance of speed and ratio).
    #[default]
    Zstd,
}

impl CompressionCodec {
    pub(crate) fn tag(self) -> u8 {
        match self {
            CompressionCodec::None => 0,
            CompressionCodec::Zstd => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CompressionCodec::None),
            1 => Some(CompressionCodec::Zstd),
            _ => None,
        }
    }
}

/// Compression behavior for the index artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressionConfig {
    /// The compression codec to use (None or Zstd).
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, where higher = better compression but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub(crate) fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    pub(crate) fn decompress(codec: CompressionCodec, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => decode_all(data),
        }
    }
}

/// Errors raised by index construction, search and persistence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// A vector's length differs from the index dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Query against an index with zero vectors.
    #[error("index is empty")]
    EmptyIndex,
    /// Build called with zero vectors.
    #[error("cannot build an index from zero vectors")]
    EmptyInput,
    #[error("k must be at least 1")]
    InvalidK,
    #[error("invalid ann config: {0}")]
    InvalidConfig(String),
    /// An artifact of the pair is missing.
    #[error("artifact not found: {path}")]
    NotFound { path: String },
    #[error("corrupt index artifact: {0}")]
    CorruptIndex(String),
    #[error("corrupt identifier table: {0}")]
    CorruptTable(String),
    /// Index and identifier table disagree on element count.
    #[error("index holds {index} vectors but identifier table holds {table} entries")]
    SizeMismatch { index: usize, table: usize },
    /// Identifier table is not the one the index was saved with.
    #[error("identifier table does not belong to this index")]
    PairMismatch,
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization encode error: {0}")]
    Encode(String),
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Io(e.to_string())
    }
}
