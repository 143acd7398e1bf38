
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::database::vector_index::normalize;
use crate::embeddings::{EmbeddingProvider, TaskType};
use crate::engine::ScoredChunk;
use crate::Result;

/// Exact second-pass re-scoring of a first-pass candidate set.
///
/// Each candidate's content is re-embedded in document mode and scored
/// against a fresh query-mode embedding of `query_text`; the first-pass
/// similarities are replaced by these inner products before sorting and
/// truncating to `top_k`. Costs one provider call for the query plus one per
/// candidate, so it is only worth running on a small over-fetched set.
///
/// Any provider failure fails the whole stage; callers that want the
/// unranked first-pass results must keep their own copy.
#[inline]
pub fn rerank(
    provider: &dyn EmbeddingProvider,
    mut candidates: Vec<ScoredChunk>,
    query_text: &str,
    top_k: usize,
) -> Result<Vec<ScoredChunk>> {
    if candidates.len() <= 1 {
        debug!("Skipping rerank for {} candidate(s)", candidates.len());
        return Ok(candidates);
    }

    debug!("Reranking {} candidates", candidates.len());

    let mut query_embedding = provider.embed(query_text, TaskType::Query)?;
    normalize(&mut query_embedding);

    for candidate in &mut candidates {
        let mut content_embedding = provider
            .embed(&candidate.chunk.content, TaskType::Document)
            .inspect_err(|e| {
                warn!("Rerank aborted on chunk {}: {}", candidate.chunk.id, e);
            })?;
        normalize(&mut content_embedding);

        candidate.similarity = query_embedding
            .iter()
            .zip(&content_embedding)
            .map(|(a, b)| a * b)
            .sum();
    }

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(top_k);

    debug!("Rerank kept {} results", candidates.len());
    Ok(candidates)
}
