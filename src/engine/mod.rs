
pub mod rerank;

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{Chunk, ChunkStore, NewChunk, VectorIndex, vector_index};
use crate::embeddings::{EmbeddingProvider, TaskType};
use crate::{RagError, Result};

const CHUNKS_FILE: &str = "chunks.json";
const INDEX_FILE: &str = "index.json";

/// Distance metric requested by the caller.
///
/// Only normalized vectors are stored, so `L2` and `InnerProduct` report
/// similarities derived from the cosine score rather than exact values
/// computed over the original un-normalized vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Cosine,
    L2,
    InnerProduct,
}

impl SearchType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SearchType::Cosine => "cosine",
            SearchType::L2 => "l2",
            SearchType::InnerProduct => "inner_product",
        }
    }
}

impl FromStr for SearchType {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(SearchType::Cosine),
            "l2" => Ok(SearchType::L2),
            "inner_product" => Ok(SearchType::InnerProduct),
            other => Err(RagError::InvalidArgument(format!(
                "Unknown search type '{other}' (expected cosine, l2, or inner_product)"
            ))),
        }
    }
}

/// A chunk paired with its similarity score for one query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// Parameters for a similarity search.
///
/// `overfetch_factor` should exceed 1 only when a rerank stage will narrow the
/// candidates back down to `top_k` afterwards.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub search_type: SearchType,
    pub top_k: usize,
    pub threshold: Option<f32>,
    pub metadata_filter: BTreeMap<String, Value>,
    pub overfetch_factor: usize,
}

impl Default for SearchOptions {
    #[inline]
    fn default() -> Self {
        Self {
            search_type: SearchType::Cosine,
            top_k: 5,
            threshold: None,
            metadata_filter: BTreeMap::new(),
            overfetch_factor: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub total_chunks: u64,
    pub vector_dimension: usize,
    pub storage_path: PathBuf,
}

struct State {
    index: VectorIndex,
    store: ChunkStore,
}

/// Owner of the vector index and chunk store pair.
///
/// All mutations run under one write lock covering both halves and their
/// flush, so readers never observe the index and store out of lockstep.
/// Embedding provider calls always happen outside the lock.
pub struct RagEngine {
    provider: Arc<dyn EmbeddingProvider>,
    state: RwLock<State>,
    storage_dir: PathBuf,
    chunks_path: PathBuf,
    index_path: PathBuf,
}

impl RagEngine {
    /// Open an engine over the storage directory from `config`, loading any
    /// persisted snapshots.
    ///
    /// Refuses to start if the index snapshot holds more vectors than the
    /// store holds chunks; those ordinals would dangle. The opposite skew (a
    /// crash between the store flush and the index flush) is recovered by
    /// dropping the orphaned store tail.
    #[inline]
    pub fn open(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let storage_dir = config.storage_dir();
        fs::create_dir_all(&storage_dir).map_err(|e| {
            RagError::Storage(format!(
                "Failed to create storage directory {}: {e}",
                storage_dir.display()
            ))
        })?;

        let chunks_path = storage_dir.join(CHUNKS_FILE);
        let index_path = storage_dir.join(INDEX_FILE);

        let mut store = ChunkStore::load(&chunks_path)?;
        let index = VectorIndex::load(&index_path, config.gemini.embedding_dimension)?;

        if index.len() > store.len() {
            return Err(RagError::Storage(format!(
                "Index snapshot has {} vectors but chunk store has {} records; refusing to serve",
                index.len(),
                store.len()
            )));
        }

        if store.len() > index.len() {
            warn!(
                "Chunk store has {} orphaned records past the index; dropping them",
                store.len() - index.len()
            );
            store.truncate(index.len());
        }

        info!(
            "Engine ready with {} chunks ({} dimensions) at {}",
            store.len(),
            index.dimension(),
            storage_dir.display()
        );

        Ok(Self {
            provider,
            state: RwLock::new(State { index, store }),
            storage_dir,
            chunks_path,
            index_path,
        })
    }

    /// Embed `content` in document mode and insert vector + chunk record as
    /// one atomic operation, returning the assigned id.
    #[inline]
    pub fn add(&self, new_chunk: NewChunk) -> Result<u64> {
        if new_chunk.content.trim().is_empty() {
            return Err(RagError::InvalidArgument(
                "Chunk content cannot be empty".to_string(),
            ));
        }

        let embedding = self.provider.embed(&new_chunk.content, TaskType::Document)?;

        let mut state = self.write_state()?;
        let ordinal = state.index.insert(embedding)?;
        let id = state.store.append(new_chunk).id;
        debug_assert_eq!(ordinal, id);

        Self::flush(&state, &self.chunks_path, &self.index_path)?;

        info!("Added chunk {}", id);
        Ok(id)
    }

    /// Search with an already-computed query embedding.
    ///
    /// Returns up to `top_k * overfetch_factor` scored chunks in descending
    /// first-pass score order, after threshold and metadata filtering.
    /// Filtering never re-sorts.
    #[inline]
    pub fn similarity_search(
        &self,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>> {
        if options.overfetch_factor == 0 {
            return Err(RagError::InvalidArgument(
                "Overfetch factor must be at least 1".to_string(),
            ));
        }

        let mut query = query_embedding.to_vec();
        vector_index::normalize(&mut query);

        let state = self.read_state()?;

        if state.index.is_empty() {
            return Ok(Vec::new());
        }

        let fetch_k = options.top_k.saturating_mul(options.overfetch_factor);
        let raw_hits = state.index.search(&query, fetch_k)?;

        let mut results = Vec::with_capacity(raw_hits.len());
        for (ordinal, raw_score) in raw_hits {
            let similarity = reported_similarity(options.search_type, raw_score);

            if options.threshold.is_some_and(|threshold| similarity < threshold) {
                continue;
            }

            let chunk = state.store.get(ordinal)?;
            if !matches_metadata(&chunk.metadata, &options.metadata_filter) {
                continue;
            }

            results.push(ScoredChunk {
                chunk: chunk.clone(),
                similarity,
            });
        }

        debug!(
            "Similarity search returned {} of {} candidates",
            results.len(),
            fetch_k
        );
        Ok(results)
    }

    /// Embed `query_text` in query mode, then run [`Self::similarity_search`]
    #[inline]
    pub fn search(&self, query_text: &str, options: &SearchOptions) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self.provider.embed(query_text, TaskType::Query)?;
        self.similarity_search(&query_embedding, options)
    }

    /// Re-score `candidates` against fresh embeddings of `query_text` and each
    /// candidate's content, then return the top `top_k`. See [`rerank::rerank`].
    #[inline]
    pub fn rerank(
        &self,
        candidates: Vec<ScoredChunk>,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        rerank::rerank(self.provider.as_ref(), candidates, query_text, top_k)
    }

    #[inline]
    pub fn info(&self) -> Result<EngineInfo> {
        let state = self.read_state()?;
        Ok(EngineInfo {
            total_chunks: state.store.len() as u64,
            vector_dimension: state.index.dimension(),
            storage_path: self.storage_dir.clone(),
        })
    }

    /// Drop every chunk and vector, then flush the empty state. Idempotent.
    #[inline]
    pub fn clear(&self) -> Result<()> {
        let mut state = self.write_state()?;
        state.store.clear();
        state.index.clear();
        Self::flush(&state, &self.chunks_path, &self.index_path)?;

        info!("Cleared all chunks");
        Ok(())
    }

    // Store before index: a crash in between leaves the store ahead, which
    // startup recovers by truncation. The reverse skew is unserveable.
    fn flush(state: &State, chunks_path: &Path, index_path: &Path) -> Result<()> {
        state.store.save(chunks_path)?;
        state.index.save(index_path)?;
        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| RagError::Storage("Engine state lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| RagError::Storage("Engine state lock poisoned".to_string()))
    }
}

/// Convert a raw inner-product score of normalized vectors into the
/// similarity reported for the requested metric.
///
/// For unit vectors `||a-b||^2 = 2 - 2*(a.b)`, so the `L2` similarity is the
/// approximation `1 / (1 + (2 - 2*score))`; true L2 over un-normalized
/// vectors is not recoverable from this index. `InnerProduct` likewise
/// reports the normalized inner product, not a magnitude-sensitive one.
#[inline]
fn reported_similarity(search_type: SearchType, raw_score: f32) -> f32 {
    match search_type {
        SearchType::Cosine | SearchType::InnerProduct => raw_score,
        SearchType::L2 => {
            let approx_l2_squared = 2.0f32.mul_add(-raw_score, 2.0);
            1.0 / (1.0 + approx_l2_squared)
        }
    }
}

/// A chunk passes iff every filter key is present in its metadata with an
/// equal value. An empty filter passes everything.
#[inline]
fn matches_metadata(metadata: &BTreeMap<String, Value>, filter: &BTreeMap<String, Value>) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}
