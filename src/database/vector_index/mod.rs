
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::{RagError, Result};

/// Append-only flat index of L2-normalized embedding vectors.
///
/// Vectors are normalized on insert, so the raw inner product of a normalized
/// query against any stored vector is its cosine similarity. Ordinals are
/// insertion positions; individual entries are never updated or removed.
pub struct VectorIndex {
    dimension: usize,
    // Row-major storage, `dimension` floats per vector
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    dimension: usize,
    data: Vec<f32>,
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left untouched.
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

impl VectorIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Normalize and append a vector, returning its ordinal
    #[inline]
    pub fn insert(&mut self, mut vector: Vec<f32>) -> Result<u64> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        normalize(&mut vector);

        let ordinal = self.len() as u64;
        self.data.extend_from_slice(&vector);

        debug!("Inserted vector at ordinal {}", ordinal);
        Ok(ordinal)
    }

    /// Return up to `k` `(ordinal, inner_product)` pairs in descending score
    /// order. The query must already be normalized; `k` is clamped to the
    /// current size.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(u64, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(ordinal, row)| {
                let score = row.iter().zip(query).map(|(a, b)| a * b).sum::<f32>();
                (ordinal as u64, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k.min(self.len()));

        Ok(scored)
    }

    /// Borrow the stored vector at `ordinal`, if present
    #[inline]
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        let start = ordinal.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Write the full index snapshot to `path`
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = IndexSnapshot {
            dimension: self.dimension,
            data: self.data.clone(),
        };

        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| RagError::Storage(format!("Failed to serialize index: {e}")))?;

        fs::write(path, bytes).map_err(|e| {
            RagError::Storage(format!("Failed to write index to {}: {e}", path.display()))
        })?;

        debug!("Flushed {} vectors to {}", self.len(), path.display());
        Ok(())
    }

    /// Load an index snapshot from `path`. A missing file is an empty index;
    /// an unreadable or corrupt snapshot, or one whose dimension disagrees
    /// with `dimension`, is a storage error.
    #[inline]
    pub fn load(path: &Path, dimension: usize) -> Result<Self> {
        if !path.exists() {
            debug!("No index snapshot at {}, starting empty", path.display());
            return Ok(Self::new(dimension));
        }

        let bytes = fs::read(path).map_err(|e| {
            RagError::Storage(format!("Failed to read index from {}: {e}", path.display()))
        })?;

        let snapshot: IndexSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            RagError::Storage(format!("Corrupt index snapshot {}: {e}", path.display()))
        })?;

        if snapshot.dimension != dimension {
            return Err(RagError::Storage(format!(
                "Index snapshot dimension {} does not match configured dimension {}",
                snapshot.dimension, dimension
            )));
        }

        if snapshot.dimension == 0 || snapshot.data.len() % snapshot.dimension != 0 {
            return Err(RagError::Storage(format!(
                "Index snapshot {} has truncated vector data",
                path.display()
            )));
        }

        let index = Self {
            dimension: snapshot.dimension,
            data: snapshot.data,
        };

        info!(
            "Loaded {} vectors ({} dimensions) from {}",
            index.len(),
            index.dimension,
            path.display()
        );
        Ok(index)
    }
}
