//! PDF document parser using pdf-extract

use std::panic::AssertUnwindSafe;
use std::path::Path;

use crate::{
    panic_message, read_bytes, source_name, DocumentParser, FileType, ParsedDocument, ParserError,
    Result,
};

/// PDF document parser
///
/// Page texts are concatenated in page order.
pub struct PdfParser;

impl PdfParser {
    /// Create a new PDF parser
    pub fn new() -> Self {
        Self
    }

    /// Extract text from in-memory PDF bytes
    ///
    /// pdf-extract panics on some malformed fonts and encodings; those
    /// panics come back as `PdfError`.
    pub fn extract(bytes: &[u8]) -> Result<String> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
            Ok(extracted) => extracted.map_err(|e| ParserError::PdfError(e.to_string())),
            Err(payload) => Err(ParserError::PdfError(format!(
                "extractor panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = read_bytes(path)?;
        let text = Self::extract(&bytes)?;

        Ok(ParsedDocument::new(source_name(path), FileType::Pdf).with_content(text))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}
