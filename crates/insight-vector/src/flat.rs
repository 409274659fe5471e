//! Exact (brute-force) L2 index
//!
//! Vectors are stored contiguously and every search scans all of them.
//!
//! File layout, little-endian:
//!
//! | field   | type              |
//! |---------|-------------------|
//! | magic   | `b"SIFX"`         |
//! | version | `u16`             |
//! | dim     | `u32`             |
//! | count   | `u64`             |
//! | data    | `count * dim` f32 |

use std::path::Path;

use crate::distance::euclidean_distance_squared;
use crate::VectorError;

const MAGIC: &[u8; 4] = b"SIFX";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 8;

/// A search hit: stored position and squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Flat index over fixed-dimension vectors
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Create an empty index
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored vector at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Append one vector
    pub fn add(&mut self, vector: &[f32]) -> Result<(), VectorError> {
        self.check_dimension(vector)?;
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Append vectors in order; nothing is added if any has the wrong dimension
    pub fn add_batch(&mut self, vectors: &[Vec<f32>]) -> Result<(), VectorError> {
        for v in vectors {
            self.check_dimension(v)?;
        }
        self.data.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.dimension || self.dimension == 0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// The `k` nearest stored vectors, nearest first
    ///
    /// Returns fewer than `k` hits when fewer vectors are stored.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                distance: euclidean_distance_squared(query, v),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        Ok(hits)
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buf.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VectorError> {
        if bytes.len() < HEADER_LEN {
            return Err(VectorError::Corrupt("truncated header".to_string()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(VectorError::Corrupt("bad magic".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(VectorError::Corrupt(format!(
                "unsupported format version {version}"
            )));
        }

        let dimension = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[10..18]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| VectorError::Corrupt("vector count overflows".to_string()))?;
        let payload = &bytes[HEADER_LEN..];
        if payload.len() != expected {
            return Err(VectorError::Corrupt(format!(
                "expected {expected} payload bytes, found {}",
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self { dimension, data })
    }

    /// Write the index to `path`
    pub fn write_to(&self, path: &Path) -> Result<(), VectorError> {
        std::fs::write(path, self.to_bytes()).map_err(|e| VectorError::io(path, e))
    }

    /// Read an index written by [`FlatL2Index::write_to`]
    pub fn read_from(path: &Path) -> Result<Self, VectorError> {
        let bytes = std::fs::read(path).map_err(|e| VectorError::io(path, e))?;
        Self::from_bytes(&bytes)
    }
}
