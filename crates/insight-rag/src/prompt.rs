//! Prompt assembly

use insight_core::DocumentChunk;

/// Separator placed between context blocks
pub const CONTEXT_DELIMITER: &str = "\n---\n";

/// Builder for the question-answering prompt
#[derive(Debug, Default)]
pub struct PromptBuilder {
    context_blocks: Vec<String>,
    question: String,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a retrieved chunk as a context block
    pub fn add_chunk(mut self, chunk: &DocumentChunk) -> Self {
        self.context_blocks.push(format!(
            "Source: {} (chunk {})\n{}",
            chunk.source, chunk.chunk_index, chunk.text
        ));
        self
    }

    /// Add every chunk in retrieval order
    pub fn add_chunks<'a>(self, chunks: impl IntoIterator<Item = &'a DocumentChunk>) -> Self {
        chunks.into_iter().fold(self, |builder, c| builder.add_chunk(c))
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        format!(
            "You are a helpful assistant. Use the context to answer.\n\n\
             Context:\n{}\n\n\
             Question: {}\n\
             Answer concisely:",
            self.context_blocks.join(CONTEXT_DELIMITER),
            self.question
        )
    }
}
