//! Insight RAG - Retrieval-augmented question answering
//!
//! The query path is a straight line:
//! 1. Load the index, metadata and embedder (once)
//! 2. Retrieve the nearest chunks for the question
//! 3. Assemble the prompt
//! 4. Generate with the configured backend
//!
//! Any failure along the way surfaces as `InsightError::Rag`.
//!
//! Author: hephaex@gmail.com

pub mod indexer;
pub mod llm;
pub mod prompt;
pub mod retriever;

pub use indexer::{build_index, BuildReport, IndexTargets};
pub use llm::{create_generator, LocalGgufGenerator, OllamaProcessGenerator};
pub use prompt::PromptBuilder;
pub use retriever::{Retriever, DEFAULT_TOP_K};

use std::sync::Arc;

use insight_core::{AppConfig, Result, TextGenerator};
use insight_vector::create_embedding_client;

// ============================================================================
// Pipeline stages
// ============================================================================

/// Stage of a single `answer` call, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RagStage {
    Idle,
    Loading,
    Retrieving,
    PromptAssembly,
    Generating,
    Done,
    Failed,
}

impl std::fmt::Display for RagStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Retrieving => "retrieving",
            Self::PromptAssembly => "prompt_assembly",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// RAG Orchestrator
// ============================================================================

/// Answers questions from the indexed documents
pub struct RagOrchestrator {
    /// Retriever over the persisted index
    retriever: Retriever,

    /// Text generation backend
    generator: Arc<dyn TextGenerator>,

    /// Chunks retrieved per question
    top_k: usize,
}

impl RagOrchestrator {
    /// Create a new orchestrator
    pub fn new(retriever: Retriever, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            retriever,
            generator,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Wire the configured embedder, index files and generator
    ///
    /// Nothing is loaded until the first question.
    pub fn from_config(config: &AppConfig) -> Self {
        let embedder = create_embedding_client(&config.embedding);
        let retriever = Retriever::new(&config.paths.index, &config.paths.metadata, embedder);
        Self::new(retriever, create_generator(&config.generator)).with_top_k(config.rag.top_k)
    }

    /// Set number of chunks retrieved per question
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer a question from the retrieved context
    pub async fn answer(&self, question: &str) -> Result<String> {
        let mut stage = RagStage::Idle;
        tracing::info!(generator = self.generator.name(), "RAG query started");

        match self.run(question, &mut stage).await {
            Ok(answer) => {
                advance(&mut stage, RagStage::Done);
                tracing::info!(answer_chars = answer.len(), "RAG query completed");
                Ok(answer)
            }
            Err(e) => {
                tracing::error!(stage = %stage, error = %e, "RAG query failed");
                advance(&mut stage, RagStage::Failed);
                Err(e.into_rag())
            }
        }
    }

    async fn run(&self, question: &str, stage: &mut RagStage) -> Result<String> {
        advance(stage, RagStage::Loading);
        self.retriever.ensure_loaded().await?;

        advance(stage, RagStage::Retrieving);
        let chunks = self.retriever.retrieve(question, self.top_k).await?;

        advance(stage, RagStage::PromptAssembly);
        let prompt = PromptBuilder::new()
            .add_chunks(&chunks)
            .question(question)
            .build();

        advance(stage, RagStage::Generating);
        tracing::debug!(prompt_chars = prompt.len(), chunks = chunks.len(), "Calling generator");
        self.generator.generate(&prompt).await
    }
}

fn advance(stage: &mut RagStage, next: RagStage) {
    tracing::debug!(from = %stage, to = %next, "RAG stage");
    *stage = next;
}

// ============================================================================
// Test doubles
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::{KeywordEmbedding, RecordingGenerator};
    use super::*;
    use insight_core::{DocumentChunk, ErrorKind};
    use insight_vector::IndexedCorpus;

    fn orchestrator(generator: Arc<RecordingGenerator>) -> RagOrchestrator {
        let embedder = KeywordEmbedding::new(&["sales", "churn", "returns", "discount"]);
        let chunks = vec![
            DocumentChunk::new("sales.txt", 0, "sales grew 12% in Q1"),
            DocumentChunk::new("churn.txt", 0, "churn fell after the loyalty program"),
            DocumentChunk::new("returns.txt", 0, "returns accepted within 30 days"),
            DocumentChunk::new("pricing.txt", 1, "discount capped at 20%"),
        ];
        let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| embedder.vector(&c.text)).collect();
        let corpus = IndexedCorpus::from_parts(&vectors, chunks).unwrap();
        let retriever = Retriever::with_corpus(corpus, Arc::new(embedder));
        RagOrchestrator::new(retriever, generator)
    }

    #[tokio::test]
    async fn test_answer_passes_generator_output_verbatim() {
        let generator = Arc::new(RecordingGenerator::replying("Sales grew 12%."));
        let rag = orchestrator(generator.clone());

        let answer = rag.answer("How did sales do?").await.unwrap();
        assert_eq!(answer, "Sales grew 12%.");

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("You are a helpful assistant."));
        assert!(prompts[0].contains("Context:\nSource: sales.txt (chunk 0)\nsales grew 12% in Q1\n---\n"));
        assert!(prompts[0].ends_with("Question: How did sales do?\nAnswer concisely:"));
        assert_eq!(prompts[0].matches("Source: ").count(), 3);
    }

    #[tokio::test]
    async fn test_top_k_limits_context() {
        let generator = Arc::new(RecordingGenerator::replying("ok"));
        let rag = orchestrator(generator.clone()).with_top_k(1);

        rag.answer("discount policy").await.unwrap();
        let prompt = &generator.prompts()[0];
        assert_eq!(prompt.matches("Source: ").count(), 1);
        assert!(prompt.contains("Source: pricing.txt (chunk 1)"));
    }

    #[tokio::test]
    async fn test_generator_failure_is_single_rag_error() {
        let generator = Arc::new(RecordingGenerator::failing("runner crashed"));
        let rag = orchestrator(generator);

        let err = rag.answer("churn?").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rag);
        assert_eq!(err.to_string(), "RAG error: runner crashed");
    }

    #[tokio::test]
    async fn test_missing_index_fails_before_generation() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(RecordingGenerator::replying("unused"));
        let retriever = Retriever::new(
            dir.path().join("faiss.index"),
            dir.path().join("docs_meta.json"),
            Arc::new(KeywordEmbedding::new(&["sales"])),
        );
        let rag = RagOrchestrator::new(retriever, generator.clone());

        let err = rag.answer("sales?").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rag);
        assert!(err.to_string().contains("Vector index not found"));
        assert!(generator.prompts().is_empty());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(RagStage::PromptAssembly.to_string(), "prompt_assembly");
        assert_eq!(RagStage::Failed.to_string(), "failed");
    }
}
