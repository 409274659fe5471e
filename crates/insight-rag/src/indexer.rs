//! Offline index build: corpus → chunks → embeddings → persisted index

use std::path::{Path, PathBuf};

use insight_core::{DocumentChunk, InsightError, Result};
use insight_parser::{chunk_document, CorpusLoader};
use insight_vector::{EmbeddingClient, IndexedCorpus};
use serde::Serialize;

/// Chunks sent to the embedder per call
pub const EMBED_BATCH_SIZE: usize = 32;

/// Outcome of an index build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Documents with extractable text
    pub documents: usize,
    /// Documents skipped because their text was empty or whitespace
    pub skipped: usize,
    /// Chunks embedded and stored
    pub chunks: usize,
}

/// Where the build reads from and writes to
#[derive(Debug, Clone)]
pub struct IndexTargets {
    pub docs_dir: PathBuf,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl IndexTargets {
    pub fn from_paths(paths: &insight_core::PathsConfig) -> Self {
        Self {
            docs_dir: paths.docs_dir.clone(),
            index_path: paths.index.clone(),
            metadata_path: paths.metadata.clone(),
        }
    }
}

/// Rebuild the index from scratch
///
/// Nothing is written when the corpus yields no chunks.
pub async fn build_index(
    targets: &IndexTargets,
    chunk_size: usize,
    embedder: &dyn EmbeddingClient,
) -> Result<BuildReport> {
    build(targets, chunk_size, embedder).await.map_err(|e| {
        tracing::error!(docs = %targets.docs_dir.display(), error = %e, "Index build failed");
        e.into_rag()
    })
}

async fn build(
    targets: &IndexTargets,
    chunk_size: usize,
    embedder: &dyn EmbeddingClient,
) -> Result<BuildReport> {
    let (chunks, mut report) = collect_chunks(&targets.docs_dir, chunk_size).await?;

    if chunks.is_empty() {
        tracing::warn!(docs = %targets.docs_dir.display(), "No text extracted; index not written");
        return Ok(report);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    tracing::info!(chunks = texts.len(), model = embedder.name(), "Embedding chunks");
    let vectors = embed_in_batches(embedder, &texts).await?;

    let corpus = IndexedCorpus::from_parts(&vectors, chunks)?;
    persist(corpus, &targets.index_path, &targets.metadata_path).await?;

    report.chunks = texts.len();
    tracing::info!(
        documents = report.documents,
        skipped = report.skipped,
        chunks = report.chunks,
        "Index built"
    );
    Ok(report)
}

async fn embed_in_batches(embedder: &dyn EmbeddingClient, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for (batch_no, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
        let embedded = embedder.embed_batch(batch).await?;
        if embedded.len() != batch.len() {
            return Err(InsightError::rag(format!(
                "Embedder returned {} vectors for {} chunks",
                embedded.len(),
                batch.len()
            )));
        }
        tracing::debug!(batch = batch_no, size = batch.len(), "Embedded batch");
        vectors.extend(embedded);
    }
    Ok(vectors)
}

async fn collect_chunks(
    docs_dir: &Path,
    chunk_size: usize,
) -> Result<(Vec<DocumentChunk>, BuildReport)> {
    let dir = docs_dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let documents = CorpusLoader::new().load_dir(&dir)?;
        let mut report = BuildReport {
            documents: 0,
            skipped: 0,
            chunks: 0,
        };
        let mut chunks = Vec::new();

        for doc in &documents {
            if doc.is_blank() {
                tracing::warn!(source = %doc.source, "Empty document, skipping");
                report.skipped += 1;
                continue;
            }
            report.documents += 1;
            chunks.extend(chunk_document(doc, chunk_size)?);
        }
        Ok::<_, InsightError>((chunks, report))
    })
    .await
    .map_err(|e| InsightError::rag(format!("Corpus loader task failed: {e}")))?
}

async fn persist(corpus: IndexedCorpus, index_path: &Path, metadata_path: &Path) -> Result<()> {
    let index_path = index_path.to_path_buf();
    let metadata_path = metadata_path.to_path_buf();
    tokio::task::spawn_blocking(move || corpus.persist(&index_path, &metadata_path))
        .await
        .map_err(|e| InsightError::rag(format!("Index writer task failed: {e}")))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::KeywordEmbedding;
    use async_trait::async_trait;
    use insight_core::ErrorKind;
    use std::sync::Mutex;

    /// Embeds a chunk holding a number as that number; records batch sizes
    #[derive(Default)]
    struct NumberEmbedding {
        batches: Mutex<Vec<usize>>,
    }

    impl NumberEmbedding {
        fn vector(text: &str) -> Vec<f32> {
            vec![text.trim().parse::<f32>().unwrap_or(-1.0)]
        }
    }

    #[async_trait]
    impl EmbeddingClient for NumberEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(Self::vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }

        fn name(&self) -> &str {
            "numbers"
        }
    }

    fn targets(root: &Path) -> IndexTargets {
        IndexTargets {
            docs_dir: root.join("docs"),
            index_path: root.join("out/faiss.index"),
            metadata_path: root.join("out/docs_meta.json"),
        }
    }

    #[tokio::test]
    async fn test_build_skips_blank_documents() {
        let dir = tempfile::tempdir().unwrap();
        let targets = targets(dir.path());
        std::fs::create_dir(&targets.docs_dir).unwrap();
        std::fs::write(targets.docs_dir.join("a.txt"), "sales ".repeat(5)).unwrap();
        std::fs::write(targets.docs_dir.join("blank.txt"), "  \n\t ").unwrap();
        std::fs::write(targets.docs_dir.join("b.txt"), "churn").unwrap();
        std::fs::write(targets.docs_dir.join("skip.csv"), "a,b").unwrap();

        let embedder = KeywordEmbedding::new(&["sales", "churn"]);
        let report = build_index(&targets, 10, &embedder).await.unwrap();

        assert_eq!(
            report,
            BuildReport {
                documents: 2,
                skipped: 1,
                chunks: 4
            }
        );

        let corpus = IndexedCorpus::load(&targets.index_path, &targets.metadata_path).unwrap();
        assert_eq!(corpus.len(), 4);
        assert!(corpus.chunks().iter().all(|c| c.source != "blank.txt"));
        let a_chunks: String = corpus
            .chunks()
            .iter()
            .filter(|c| c.source == "a.txt")
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(a_chunks, "sales ".repeat(5));
    }

    #[tokio::test]
    async fn test_empty_corpus_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let targets = targets(dir.path());
        std::fs::create_dir(&targets.docs_dir).unwrap();
        std::fs::write(targets.docs_dir.join("blank.txt"), "   ").unwrap();

        let report = build_index(&targets, 800, &KeywordEmbedding::new(&["x"]))
            .await
            .unwrap();

        assert_eq!(report.chunks, 0);
        assert!(!targets.index_path.exists());
        assert!(!targets.metadata_path.exists());
    }

    #[tokio::test]
    async fn test_missing_docs_dir_is_rag_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_index(&targets(dir.path()), 800, &KeywordEmbedding::new(&["x"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rag);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let targets = targets(dir.path());
        std::fs::create_dir(&targets.docs_dir).unwrap();
        std::fs::write(targets.docs_dir.join("a.txt"), "text").unwrap();

        let err = build_index(&targets, 0, &KeywordEmbedding::new(&["x"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Chunk size"));
    }

    #[tokio::test]
    async fn test_embeds_in_batches_keeping_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let targets = targets(dir.path());
        std::fs::create_dir(&targets.docs_dir).unwrap();
        let text: String = (0..70).map(|i| format!("{i:04} ")).collect();
        std::fs::write(targets.docs_dir.join("numbers.txt"), text).unwrap();

        let embedder = NumberEmbedding::default();
        let report = build_index(&targets, 5, &embedder).await.unwrap();
        assert_eq!(report.chunks, 70);
        assert_eq!(*embedder.batches.lock().unwrap(), vec![32, 32, 6]);

        let corpus = IndexedCorpus::load(&targets.index_path, &targets.metadata_path).unwrap();
        for i in 0..70 {
            assert_eq!(corpus.chunks()[i].text, format!("{i:04} "));
            let hit = &corpus.search(&[i as f32], 1).unwrap()[0];
            assert_eq!(hit.chunk.chunk_index, i);
            assert_eq!(hit.distance, 0.0);
        }
    }
}
