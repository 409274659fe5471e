//! Query-time retrieval over the persisted index

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use insight_core::{DocumentChunk, InsightError, Result};
use insight_vector::{EmbeddingClient, IndexedCorpus};
use tokio::sync::OnceCell;

/// Default number of chunks per question
pub const DEFAULT_TOP_K: usize = 3;

/// Embeds a query and returns the nearest stored chunks
///
/// The index and metadata are read from disk once, on first use.
pub struct Retriever {
    index_path: PathBuf,
    metadata_path: PathBuf,
    embedder: Arc<dyn EmbeddingClient>,
    corpus: OnceCell<IndexedCorpus>,
    loads: AtomicUsize,
}

impl Retriever {
    /// Create a retriever over the index files at the given paths
    pub fn new(
        index_path: impl Into<PathBuf>,
        metadata_path: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            index_path: index_path.into(),
            metadata_path: metadata_path.into(),
            embedder,
            corpus: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Create a retriever over an in-memory corpus
    pub fn with_corpus(corpus: IndexedCorpus, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            index_path: PathBuf::new(),
            metadata_path: PathBuf::new(),
            embedder,
            corpus: OnceCell::new_with(Some(corpus)),
            loads: AtomicUsize::new(0),
        }
    }

    /// Load the index and metadata if not loaded yet
    pub async fn ensure_loaded(&self) -> Result<&IndexedCorpus> {
        self.corpus
            .get_or_try_init(|| async {
                let index_path = self.index_path.clone();
                let metadata_path = self.metadata_path.clone();
                tracing::info!(index = %index_path.display(), "Loading vector index");
                self.loads.fetch_add(1, Ordering::AcqRel);

                let corpus = tokio::task::spawn_blocking(move || {
                    IndexedCorpus::load(&index_path, &metadata_path)
                })
                .await
                .map_err(|e| InsightError::rag(format!("Index loader task failed: {e}")))??;
                Ok::<_, InsightError>(corpus)
            })
            .await
    }

    pub fn is_loaded(&self) -> bool {
        self.corpus.initialized()
    }

    /// Number of times the index files have been read
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// Up to `k` chunks nearest to `query`, nearest first
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        self.retrieve_inner(query, k).await.map_err(|e| {
            tracing::error!(error = %e, "Retrieval failed");
            e.into_rag()
        })
    }

    async fn retrieve_inner(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        let corpus = self.ensure_loaded().await?;
        let vector = self.embedder.embed(query).await?;
        let hits = corpus.search(&vector, k)?;

        tracing::debug!(k, hits = hits.len(), "Retrieved chunks");
        Ok(hits.into_iter().map(|hit| hit.chunk).collect())
    }
}
