//! vsearch image embeddings
//!
//! This crate turns raw image bytes into fixed-length, L2-normalized vectors that the
//! index crate can search. Everything downstream only sees the [`Embedder`] trait, so the
//! function behind it can be swapped (a neural model served elsewhere, a test double) without
//! touching the index or the query path.
//!
//! The bundled [`PixelEmbedder`] is deterministic and dependency-light: a centred RGB
//! thumbnail plus a joint colour histogram. It is good enough to find near-duplicates and
//! same-palette products, and it keeps builds reproducible.
//!
//! ## Quick example
//!
//! ```no_run
//! use embed::{Embedder, EmbedConfig, PixelEmbedder};
//!
//! let embedder = PixelEmbedder::new(EmbedConfig::default()).unwrap();
//! let bytes = std::fs::read("data/images/001_shoe.jpg").unwrap();
//! let embedding = embedder.embed(&bytes).unwrap();
//! assert_eq!(embedding.vector.len(), embedder.dimension());
//! ```

pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

mod pixel;

pub use crate::config::EmbedConfig;
pub use crate::error::EmbedError;
pub use crate::normalize::l2_normalize_in_place;
pub use crate::pixel::PixelEmbedder;
pub use crate::types::Embedding;

/// Maps image bytes to a unit vector of a fixed dimension.
///
/// Implementations must be deterministic: the same bytes always produce the same vector.
pub trait Embedder: Send + Sync {
    /// Label reported on every [`Embedding`] and in catalog stats.
    fn model_name(&self) -> &str;

    /// Length of every vector returned by [`embed`](Self::embed).
    fn dimension(&self) -> usize;

    fn embed(&self, image_bytes: &[u8]) -> Result<Embedding, EmbedError>;
}
