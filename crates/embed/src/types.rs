use serde::{Deserialize, Serialize};

/// Embedding output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    /// Final embedding values.
    pub vector: Vec<f32>,
    /// Name of the embedder that produced the vector.
    pub model_name: String,
    /// Dimension of `vector`.
    pub embedding_dim: usize,
    /// Whether [`vector`](Self::vector) was L2-normalized.
    pub normalized: bool,
}

impl Embedding {
    pub fn into_vector(self) -> Vec<f32> {
        self.vector
    }
}
