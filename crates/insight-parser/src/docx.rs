//! DOCX document parser using docx-rs
//!
//! Only body paragraphs are read; each paragraph becomes one line.

use std::path::Path;

use docx_rs::{read_docx, DocumentChild, ParagraphChild, RunChild};

use crate::{read_bytes, source_name, DocumentParser, FileType, ParsedDocument, ParserError, Result};

/// DOCX document parser
pub struct DocxParser;

impl DocxParser {
    /// Create a new DOCX parser
    pub fn new() -> Self {
        Self
    }

    /// Extract paragraph text from in-memory DOCX bytes
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let docx = read_docx(bytes).map_err(|e| ParserError::DocxError(e.to_string()))?;

        let paragraphs: Vec<String> = docx
            .document
            .children
            .iter()
            .filter_map(|child| match child {
                DocumentChild::Paragraph(para) => {
                    let mut text = String::new();
                    for child in &para.children {
                        if let ParagraphChild::Run(run) = child {
                            for run_child in &run.children {
                                if let RunChild::Text(t) = run_child {
                                    text.push_str(&t.text);
                                }
                            }
                        }
                    }
                    Some(text)
                }
                _ => None,
            })
            .collect();

        Ok(paragraphs.join("\n"))
    }
}

impl Default for DocxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for DocxParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = read_bytes(path)?;
        let text = Self::extract(&bytes)?;

        Ok(ParsedDocument::new(source_name(path), FileType::Docx).with_content(text))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Docx]
    }
}
