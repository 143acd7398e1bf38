
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::{RagError, Result};

/// A stored text chunk. Immutable once created; its `id` equals the ordinal
/// of its vector in the paired [`crate::database::VectorIndex`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: u64,
    pub content: String,
    pub document_id: Option<String>,
    pub chunk_index: Option<u32>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller when adding a chunk
#[derive(Debug, Clone, Default)]
pub struct NewChunk {
    pub content: String,
    pub document_id: Option<String>,
    pub chunk_index: Option<u32>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Side table of chunk records kept in lockstep with the vector index
#[derive(Default)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Append a record, assigning the next sequential id. The caller must pair
    /// this with the matching index insert under one write lock.
    #[inline]
    pub fn append(&mut self, new_chunk: NewChunk) -> &Chunk {
        let chunk = Chunk {
            id: self.chunks.len() as u64,
            content: new_chunk.content,
            document_id: new_chunk.document_id,
            chunk_index: new_chunk.chunk_index,
            metadata: new_chunk.metadata,
            created_at: Utc::now(),
        };
        self.chunks.push(chunk);

        debug!("Appended chunk {}", self.chunks.len() - 1);
        // Just pushed, the index is always valid
        &self.chunks[self.chunks.len() - 1]
    }

    #[inline]
    pub fn get(&self, id: u64) -> Result<&Chunk> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.chunks.get(idx))
            .ok_or(RagError::NotFound(id))
    }

    #[inline]
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Drop records past `len`. Used on startup to discard an orphaned tail
    /// left by a crash between the store flush and the index flush.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.chunks.truncate(len);
    }

    /// Write the full chunk list to `path`
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(&self.chunks)
            .map_err(|e| RagError::Storage(format!("Failed to serialize chunks: {e}")))?;

        fs::write(path, bytes).map_err(|e| {
            RagError::Storage(format!("Failed to write chunks to {}: {e}", path.display()))
        })?;

        debug!("Flushed {} chunks to {}", self.chunks.len(), path.display());
        Ok(())
    }

    /// Load a chunk snapshot from `path`. A missing file is an empty store;
    /// an unreadable snapshot or one whose ids are not sequential ordinals is
    /// a storage error.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No chunk snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let bytes = fs::read(path).map_err(|e| {
            RagError::Storage(format!("Failed to read chunks from {}: {e}", path.display()))
        })?;

        let chunks: Vec<Chunk> = serde_json::from_slice(&bytes).map_err(|e| {
            RagError::Storage(format!("Corrupt chunk snapshot {}: {e}", path.display()))
        })?;

        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.id != position as u64 {
                return Err(RagError::Storage(format!(
                    "Chunk snapshot {} has id {} at position {}",
                    path.display(),
                    chunk.id,
                    position
                )));
            }
        }

        info!("Loaded {} chunks from {}", chunks.len(), path.display());
        Ok(Self { chunks })
    }
}
