//! Insight Vector - Embeddings and exact nearest-neighbor search
//!
//! Provides:
//! - `EmbeddingClient` implementations (in-process BERT encoder, Ollama HTTP)
//! - `FlatL2Index`, a brute-force Euclidean index with a binary file format
//! - `IndexedCorpus`, the index plus its positionally aligned chunk metadata
//!
//! Author: hephaex@gmail.com

pub mod distance;
pub mod embedding;
pub mod flat;
pub mod store;

pub use embedding::{
    create_embedding_client, EmbeddingClient, LazyEmbeddingClient, LocalBertEmbedding,
    OllamaEmbedding,
};
pub use flat::{FlatL2Index, Neighbor};
pub use store::{IndexedCorpus, ScoredChunk};

use insight_core::InsightError;
use thiserror::Error;

/// Vector index errors
#[derive(Error, Debug)]
pub enum VectorError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Vector index is corrupt: {0}")]
    Corrupt(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index and metadata are misaligned: {vectors} vectors, {metadata} metadata records")]
    Misaligned { vectors: usize, metadata: usize },

    #[error("Index not built: {0} is missing")]
    NotBuilt(String),

    #[error("Metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl VectorError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<VectorError> for InsightError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::NotBuilt(_) => InsightError::missing("Vector index", "index"),
            other => InsightError::rag_from(other),
        }
    }
}
