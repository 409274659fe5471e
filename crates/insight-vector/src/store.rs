//! Index plus chunk metadata, kept positionally aligned
//!
//! Vector `i` of the index belongs to `metadata[i]`. The two halves are
//! persisted to separate files and both must be present to load.

use std::path::Path;

use insight_core::DocumentChunk;

use crate::flat::FlatL2Index;
use crate::VectorError;

/// A retrieved chunk with its squared distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub distance: f32,
}

/// Searchable corpus of embedded chunks
#[derive(Debug, Clone)]
pub struct IndexedCorpus {
    index: FlatL2Index,
    metadata: Vec<DocumentChunk>,
}

impl IndexedCorpus {
    /// Create an empty corpus for vectors of `dimension`
    pub fn new(dimension: usize) -> Self {
        Self {
            index: FlatL2Index::new(dimension),
            metadata: Vec::new(),
        }
    }

    /// Build from parallel lists of vectors and chunks
    pub fn from_parts(
        vectors: &[Vec<f32>],
        chunks: Vec<DocumentChunk>,
    ) -> Result<Self, VectorError> {
        if vectors.len() != chunks.len() {
            return Err(VectorError::Misaligned {
                vectors: vectors.len(),
                metadata: chunks.len(),
            });
        }
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut index = FlatL2Index::new(dimension);
        if !vectors.is_empty() {
            index.add_batch(vectors)?;
        }
        Ok(Self {
            index,
            metadata: chunks,
        })
    }

    /// Append one embedded chunk
    pub fn add(&mut self, vector: &[f32], chunk: DocumentChunk) -> Result<(), VectorError> {
        self.index.add(vector)?;
        self.metadata.push(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.metadata
    }

    /// The `k` chunks nearest to `query`, nearest first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, VectorError> {
        let hits = self.index.search(query, k)?;
        hits.into_iter()
            .map(|hit| {
                self.metadata
                    .get(hit.position)
                    .map(|chunk| ScoredChunk {
                        chunk: chunk.clone(),
                        distance: hit.distance,
                    })
                    .ok_or(VectorError::Misaligned {
                        vectors: self.index.len(),
                        metadata: self.metadata.len(),
                    })
            })
            .collect()
    }

    /// Write the index blob and the metadata JSON, creating parent directories
    pub fn persist(&self, index_path: &Path, metadata_path: &Path) -> Result<(), VectorError> {
        for path in [index_path, metadata_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| VectorError::io(parent, e))?;
            }
        }

        self.index.write_to(index_path)?;
        let json = serde_json::to_vec_pretty(&self.metadata)?;
        std::fs::write(metadata_path, json).map_err(|e| VectorError::io(metadata_path, e))?;

        tracing::info!(
            index = %index_path.display(),
            metadata = %metadata_path.display(),
            vectors = self.len(),
            "Persisted vector index"
        );
        Ok(())
    }

    /// Load a corpus written by [`IndexedCorpus::persist`]
    pub fn load(index_path: &Path, metadata_path: &Path) -> Result<Self, VectorError> {
        for path in [index_path, metadata_path] {
            if !path.exists() {
                return Err(VectorError::NotBuilt(path.display().to_string()));
            }
        }

        let index = FlatL2Index::read_from(index_path)?;
        let bytes = std::fs::read(metadata_path).map_err(|e| VectorError::io(metadata_path, e))?;
        let metadata: Vec<DocumentChunk> = serde_json::from_slice(&bytes)?;

        if index.len() != metadata.len() {
            return Err(VectorError::Misaligned {
                vectors: index.len(),
                metadata: metadata.len(),
            });
        }

        tracing::debug!(vectors = metadata.len(), "Loaded vector index");
        Ok(Self { index, metadata })
    }
}
