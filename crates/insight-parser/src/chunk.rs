//! Fixed-width chunking
//!
//! Text is cut into consecutive, non-overlapping windows of `chunk_size`
//! characters; only the last window may be shorter. Windows never split a
//! character and never look at word boundaries.

use insight_core::DocumentChunk;

use crate::{ParsedDocument, ParserError, Result};

/// Default chunk width in characters
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Lazy iterator over the chunks of a string
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    size: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .char_indices()
            .nth(self.size)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(head)
    }
}

/// Slice `text` into windows of `size` characters
pub fn chunk_text(text: &str, size: usize) -> Result<Chunks<'_>> {
    if size == 0 {
        return Err(ParserError::InvalidChunkSize);
    }
    Ok(Chunks { rest: text, size })
}

/// Chunk a parsed document, numbering chunks from zero
pub fn chunk_document(doc: &ParsedDocument, size: usize) -> Result<Vec<DocumentChunk>> {
    Ok(chunk_text(&doc.content, size)?
        .enumerate()
        .map(|(i, text)| DocumentChunk::new(doc.source.clone(), i, text))
        .collect())
}
