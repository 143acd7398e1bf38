#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end engine scenarios with a deterministic in-process provider

use rag_query::config::{Config, GeminiConfig, SearchConfig};
use rag_query::database::NewChunk;
use rag_query::embeddings::{EmbeddingProvider, TaskType};
use rag_query::engine::{RagEngine, SearchOptions, SearchType};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 64;

/// Bag-of-words embedding provider: texts sharing tokens score higher, which
/// is enough semantic signal for retrieval assertions.
struct BagOfWordsProvider {
    dimension: usize,
}

impl BagOfWordsProvider {
    fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingProvider for BagOfWordsProvider {
    fn embed(&self, text: &str, _task: TaskType) -> rag_query::Result<Vec<f32>> {
        let mut vector = vec![0.0; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            vector[(hash % self.dimension as u64) as usize] += 1.0;
        }
        Ok(vector)
    }
}

fn test_config(base_dir: &std::path::Path) -> Config {
    Config {
        gemini: GeminiConfig {
            embedding_dimension: DIMENSION,
            ..GeminiConfig::default()
        },
        search: SearchConfig::default(),
        base_dir: base_dir.to_path_buf(),
    }
}

fn open_engine(base_dir: &std::path::Path) -> RagEngine {
    let config = test_config(base_dir);
    RagEngine::open(&config, Arc::new(BagOfWordsProvider::new(DIMENSION)))
        .expect("should open engine")
}

fn seed_knowledge_base(engine: &RagEngine) {
    engine
        .add(NewChunk {
            content: "Python is a high-level programming language known for its readability"
                .to_string(),
            document_id: Some("languages".to_string()),
            chunk_index: Some(0),
            metadata: BTreeMap::from([("topic".to_string(), json!("programming"))]),
        })
        .expect("should add Python chunk");

    engine
        .add(NewChunk {
            content: "PostgreSQL is a relational database with strong SQL support".to_string(),
            document_id: Some("databases".to_string()),
            chunk_index: Some(0),
            metadata: BTreeMap::from([("topic".to_string(), json!("databases"))]),
        })
        .expect("should add PostgreSQL chunk");
}

#[test]
fn query_retrieves_the_semantically_closer_chunk() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = open_engine(temp_dir.path());
    seed_knowledge_base(&engine);

    let top_one = engine
        .search(
            "What is Python?",
            &SearchOptions {
                search_type: SearchType::from_str("cosine").expect("parse"),
                top_k: 1,
                ..SearchOptions::default()
            },
        )
        .expect("search should succeed");

    assert_eq!(top_one.len(), 1);
    assert!(top_one[0].chunk.content.starts_with("Python"));

    let both = engine
        .search(
            "What is Python?",
            &SearchOptions {
                top_k: 2,
                ..SearchOptions::default()
            },
        )
        .expect("search should succeed");

    assert_eq!(both.len(), 2);
    assert!(both[0].chunk.content.starts_with("Python"));
    assert!(both[0].similarity > both[1].similarity);
}

#[test]
fn metadata_filter_restricts_results() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = open_engine(temp_dir.path());
    seed_knowledge_base(&engine);

    let results = engine
        .search(
            "What is Python?",
            &SearchOptions {
                top_k: 2,
                metadata_filter: BTreeMap::from([("topic".to_string(), json!("databases"))]),
                ..SearchOptions::default()
            },
        )
        .expect("search should succeed");

    assert_eq!(results.len(), 1);
    assert!(results[0].chunk.content.starts_with("PostgreSQL"));
}

#[test]
fn state_survives_process_restart() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    {
        let engine = open_engine(temp_dir.path());
        seed_knowledge_base(&engine);
    }

    let engine = open_engine(temp_dir.path());
    let engine_info = engine.info().expect("info");

    assert_eq!(engine_info.total_chunks, 2);
    assert_eq!(engine_info.vector_dimension, DIMENSION);

    let results = engine
        .search(
            "relational database",
            &SearchOptions {
                top_k: 1,
                ..SearchOptions::default()
            },
        )
        .expect("search should succeed");
    assert!(results[0].chunk.content.starts_with("PostgreSQL"));
}

#[test]
fn overfetch_plus_rerank_returns_top_k() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = open_engine(temp_dir.path());
    seed_knowledge_base(&engine);

    let candidates = engine
        .search(
            "What is Python?",
            &SearchOptions {
                top_k: 1,
                overfetch_factor: 2,
                ..SearchOptions::default()
            },
        )
        .expect("search should succeed");
    assert_eq!(candidates.len(), 2);

    let reranked = engine
        .rerank(candidates, "What is Python?", 1)
        .expect("rerank should succeed");

    assert_eq!(reranked.len(), 1);
    assert!(reranked[0].chunk.content.starts_with("Python"));
}

#[test]
fn clear_then_query_returns_empty() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = open_engine(temp_dir.path());
    seed_knowledge_base(&engine);

    engine.clear().expect("clear should succeed");

    let results = engine
        .search("What is Python?", &SearchOptions::default())
        .expect("search should succeed");
    assert!(results.is_empty());
    assert_eq!(engine.info().expect("info").total_chunks, 0);
}
