//! Corpus loading
//!
//! Walks a documents directory and extracts the text of every supported
//! file. A file that fails to parse contributes empty text instead of
//! aborting the whole corpus.

use std::path::{Path, PathBuf};

use crate::{source_name, FileType, ParsedDocument, ParserError, ParserRegistry, Result};

/// Loads every supported document of a directory
pub struct CorpusLoader {
    registry: ParserRegistry,
}

impl CorpusLoader {
    /// Create a loader with the default parsers
    pub fn new() -> Self {
        Self {
            registry: ParserRegistry::with_defaults(),
        }
    }

    /// Create a loader over a custom registry
    pub fn with_registry(registry: ParserRegistry) -> Self {
        Self { registry }
    }

    /// Load all documents directly inside `dir`, ordered by file name
    ///
    /// Subdirectories and unsupported extensions are skipped with a warning.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<ParsedDocument>> {
        if !dir.is_dir() {
            return Err(ParserError::DirectoryNotFound(dir.display().to_string()));
        }

        let entries = std::fs::read_dir(dir).map_err(|e| ParserError::IoError {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ParserError::IoError {
                path: dir.display().to_string(),
                source: e,
            })?;
            paths.push(entry.path());
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            if path.is_dir() {
                tracing::debug!(path = %path.display(), "Skipping subdirectory");
                continue;
            }
            if !self.registry.supports(&path) {
                tracing::warn!(path = %path.display(), "Unsupported file type, skipping");
                continue;
            }
            documents.push(self.load_file(&path));
        }

        tracing::info!(dir = %dir.display(), documents = documents.len(), "Loaded corpus");
        Ok(documents)
    }

    /// Extract one document, yielding empty text on failure
    pub fn load_file(&self, path: &Path) -> ParsedDocument {
        match self.registry.parse(path) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to extract text");
                ParsedDocument::new(source_name(path), FileType::from_path(path))
            }
        }
    }
}

impl Default for CorpusLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("docs");

        let err = CorpusLoader::new().load_dir(&missing).unwrap_err();
        assert!(matches!(err, ParserError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_unsupported_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(dir.path().join("archive")).unwrap();

        let docs = CorpusLoader::new().load_dir(dir.path()).unwrap();
        let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "b.txt"]);
        assert_eq!(docs[0].content, "first");
    }

    #[test]
    fn test_corrupt_file_yields_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.docx"), b"not a zip").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "kept").unwrap();

        let docs = CorpusLoader::new().load_dir(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);

        let broken = docs.iter().find(|d| d.source == "broken.docx").unwrap();
        assert!(broken.is_blank());
        assert_eq!(broken.file_type, FileType::Docx);

        let notes = docs.iter().find(|d| d.source == "notes.txt").unwrap();
        assert_eq!(notes.content, "kept");
    }

    struct PanickingPdfParser;

    impl crate::DocumentParser for PanickingPdfParser {
        fn parse(&self, _path: &Path) -> Result<ParsedDocument> {
            panic!("missing width")
        }

        fn supported_types(&self) -> &[FileType] {
            &[FileType::Pdf]
        }
    }

    #[test]
    fn test_panicking_parser_yields_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "still indexed").unwrap();

        let mut registry = ParserRegistry::new();
        registry.register(crate::PlainTextParser);
        registry.register(PanickingPdfParser);

        let docs = CorpusLoader::with_registry(registry)
            .load_dir(dir.path())
            .unwrap();
        assert_eq!(docs.len(), 2);

        let scan = docs.iter().find(|d| d.source == "scan.pdf").unwrap();
        assert!(scan.is_blank());
        assert_eq!(scan.file_type, FileType::Pdf);

        let notes = docs.iter().find(|d| d.source == "notes.txt").unwrap();
        assert_eq!(notes.content, "still indexed");
    }
}
