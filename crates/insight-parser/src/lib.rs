//! Insight Parser - Document corpus loading and chunking
//!
//! Supports text extraction from:
//! - Plain text files
//! - PDF documents
//! - Microsoft Word (DOCX)
//!
//! Each parser implements the `DocumentParser` trait and produces a
//! `ParsedDocument`. The `CorpusLoader` walks a directory and dispatches
//! on file extension; the `chunk` module slices extracted text into
//! fixed-width pieces for embedding.
//!
//! Author: hephaex@gmail.com

use std::panic::AssertUnwindSafe;
use std::path::Path;
use thiserror::Error;

pub mod chunk;
pub mod corpus;
pub mod docx;
pub mod pdf;

pub use chunk::{chunk_document, chunk_text, Chunks, DEFAULT_CHUNK_SIZE};
pub use corpus::CorpusLoader;
pub use docx::DocxParser;
pub use pdf::PdfParser;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document parsing
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading the file
    #[error("IO error reading {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// DOCX parsing error
    #[error("DOCX parsing error: {0}")]
    DocxError(String),

    /// Chunk width of zero
    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,

    /// Corpus directory does not exist
    #[error("Documents directory not found: {0}")]
    DirectoryNotFound(String),

    /// A parser panicked while reading the file
    #[error("Parser panicked on {path}: {message}")]
    Panicked { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, ParserError>;

impl From<ParserError> for insight_core::InsightError {
    fn from(err: ParserError) -> Self {
        insight_core::InsightError::rag_from(err)
    }
}

// ============================================================================
// Parsed Document Types
// ============================================================================

/// Text extracted from one source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    /// File name of the source (no directory)
    pub source: String,

    /// Detected file type
    pub file_type: FileType,

    /// Extracted text content
    pub content: String,
}

impl ParsedDocument {
    /// Create a new parsed document with empty content
    pub fn new(source: impl Into<String>, file_type: FileType) -> Self {
        Self {
            source: source.into(),
            file_type,
            content: String::new(),
        }
    }

    /// Set content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Whether extraction produced nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Character count of the extracted text
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    PlainText,
    Pdf,
    Docx,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" => Self::PlainText,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlainText => write!(f, "text"),
            Self::Pdf => write!(f, "pdf"),
            Self::Docx => write!(f, "docx"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// File name component of a path, used as the chunk source
pub(crate) fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| ParserError::IoError {
        path: path.display().to_string(),
        source: e,
    })
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Extract the text of a document
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the text, PDF and DOCX parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PlainTextParser);
        registry.register(PdfParser::new());
        registry.register(DocxParser::new());
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// Whether some registered parser handles this path
    pub fn supports(&self, path: &Path) -> bool {
        self.find_parser(FileType::from_path(path)).is_some()
    }

    /// Parse a file using the appropriate parser
    pub fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let file_type = FileType::from_path(path);

        let parser = self.find_parser(file_type).ok_or_else(|| {
            ParserError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            )
        })?;

        std::panic::catch_unwind(AssertUnwindSafe(|| parser.parse(path))).unwrap_or_else(|payload| {
            Err(ParserError::Panicked {
                path: path.display().to_string(),
                message: panic_message(payload.as_ref()),
            })
        })
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Plain Text
// ============================================================================

/// Plain text parser
///
/// Invalid UTF-8 sequences are dropped rather than failing the document.
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = read_bytes(path)?;
        let content: String = bytes.utf8_chunks().map(|chunk| chunk.valid()).collect();

        Ok(ParsedDocument::new(source_name(path), FileType::PlainText).with_content(content))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("txt"), FileType::PlainText);
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_extension("docx"), FileType::Docx);
        assert_eq!(FileType::from_extension("doc"), FileType::Unknown);
        assert_eq!(
            FileType::from_path(&PathBuf::from("notes/q3.TXT")),
            FileType::PlainText
        );
        assert_eq!(
            FileType::from_path(&PathBuf::from("README")),
            FileType::Unknown
        );
    }

    #[test]
    fn test_registry_rejects_unknown_extension() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse(Path::new("slides.pptx")).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedFormat(ref ext) if ext == "pptx"));
        assert!(!registry.supports(Path::new("slides.pptx")));
        assert!(registry.supports(Path::new("report.pdf")));
    }

    #[test]
    fn test_plain_text_uses_file_name_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.txt");
        std::fs::write(&path, b"Returns within 30 days\n").unwrap();

        let doc = PlainTextParser.parse(&path).unwrap();
        assert_eq!(doc.source, "policy.txt");
        assert_eq!(doc.file_type, FileType::PlainText);
        assert_eq!(doc.content, "Returns within 30 days\n");
        assert!(!doc.is_blank());
    }

    #[test]
    fn test_plain_text_tolerates_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.txt");
        std::fs::write(&path, [b'c', b'a', b'f', 0xE9]).unwrap();

        let doc = PlainTextParser.parse(&path).unwrap();
        assert_eq!(doc.content, "caf");
        assert!(!doc.content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_invalid_bytes_mid_text_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.txt");
        std::fs::write(&path, [b'a', 0xFF, 0xFE, b'b', b' ', 0xC3, 0xA9]).unwrap();

        let doc = PlainTextParser.parse(&path).unwrap();
        assert_eq!(doc.content, "ab é");
    }

    struct ExplodingParser;

    impl DocumentParser for ExplodingParser {
        fn parse(&self, _path: &Path) -> Result<ParsedDocument> {
            panic!("unsupported cmap")
        }

        fn supported_types(&self) -> &[FileType] {
            &[FileType::Pdf]
        }
    }

    #[test]
    fn test_registry_turns_parser_panic_into_error() {
        let mut registry = ParserRegistry::new();
        registry.register(ExplodingParser);

        let err = registry.parse(Path::new("scan.pdf")).unwrap_err();
        match err {
            ParserError::Panicked { path, message } => {
                assert_eq!(path, "scan.pdf");
                assert_eq!(message, "unsupported cmap");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parser_error_becomes_rag_error() {
        let err: insight_core::InsightError = ParserError::InvalidChunkSize.into();
        assert_eq!(err.kind(), insight_core::ErrorKind::Rag);
    }
}
