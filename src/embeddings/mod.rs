// Embeddings module
// Defines the provider seam and the Gemini embedContent client

pub mod gemini;

pub use gemini::GeminiClient;

use crate::Result;

/// Task hint passed to the embedding model. Queries and documents are embedded
/// asymmetrically; ingestion and reranking of chunk content must both use
/// [`TaskType::Document`] so the two sides stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Query,
    Document,
}

impl TaskType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Query => "RETRIEVAL_QUERY",
            TaskType::Document => "RETRIEVAL_DOCUMENT",
        }
    }
}

/// Maps text to a fixed-length embedding vector. Implementations are expected
/// to be blocking; failures surface as [`crate::RagError::EmbeddingProvider`]
/// and are never retried by callers in this crate's core.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>>;
}
