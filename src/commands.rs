use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::NewChunk;
use crate::embeddings::GeminiClient;
use crate::engine::{RagEngine, SearchOptions, SearchType};

fn open_engine(config: &Config) -> Result<RagEngine> {
    let client = GeminiClient::new(&config.gemini).context("Failed to create Gemini client")?;
    RagEngine::open(config, Arc::new(client)).context("Failed to open engine")
}

/// Parse `key=value` pairs into a metadata map. Values that parse as JSON
/// scalars keep their type; everything else is stored as a string.
pub fn parse_key_values(pairs: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid key=value pair: {pair}");
        };
        if key.is_empty() {
            bail!("Invalid key=value pair: {pair}");
        }
        let value = Value::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Embed and store a chunk of content
#[inline]
pub fn add_chunk(
    config: &Config,
    content: String,
    document_id: Option<String>,
    chunk_index: Option<u32>,
    metadata_pairs: &[String],
) -> Result<()> {
    let metadata = parse_key_values(metadata_pairs)?;
    let engine = open_engine(config)?;

    let id = engine.add(NewChunk {
        content,
        document_id,
        chunk_index,
        metadata,
    })?;

    println!("Added chunk {id}");
    Ok(())
}

/// Query the store and print ranked results
#[inline]
pub fn search(
    config: &Config,
    query: &str,
    search_type: &str,
    top_k: Option<usize>,
    threshold: Option<f32>,
    filter_pairs: &[String],
    rerank: bool,
) -> Result<()> {
    let search_type = SearchType::from_str(search_type)?;
    let top_k = top_k.unwrap_or(config.search.default_top_k);
    let metadata_filter = parse_key_values(filter_pairs)?;

    let options = SearchOptions {
        search_type,
        top_k,
        threshold,
        metadata_filter,
        overfetch_factor: if rerank {
            config.search.overfetch_factor
        } else {
            1
        },
    };

    let engine = open_engine(config)?;
    let mut results = engine.search(query, &options)?;

    if rerank {
        info!("Reranking {} candidates", results.len());
        match engine.rerank(results.clone(), query, top_k) {
            Ok(reranked) => results = reranked,
            Err(e) => {
                // No partial rerank; fall back to the first-pass order
                warn!("Rerank failed, falling back to first-pass results: {e}");
                results.truncate(top_k);
            }
        }
    }

    if results.is_empty() {
        println!("No results");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] chunk {} {}",
            rank + 1,
            result.similarity,
            result.chunk.id,
            result
                .chunk
                .document_id
                .as_deref()
                .map(|d| format!("({d})"))
                .unwrap_or_default()
        );
        println!("   {}", result.chunk.content);
    }

    Ok(())
}

/// Print store statistics
#[inline]
pub fn show_info(config: &Config) -> Result<()> {
    let engine = open_engine(config)?;
    let engine_info = engine.info()?;

    println!("Total chunks: {}", engine_info.total_chunks);
    println!("Vector dimension: {}", engine_info.vector_dimension);
    println!("Storage path: {}", engine_info.storage_path.display());
    Ok(())
}

/// Delete every stored chunk and vector
#[inline]
pub fn clear_store(config: &Config) -> Result<()> {
    let engine = open_engine(config)?;
    engine.clear()?;

    println!("Cleared all chunks");
    Ok(())
}

/// Print the active configuration
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("Config directory: {}", config.base_dir.display());
    println!("API base: {}", config.gemini.api_base);
    println!("Embedding model: {}", config.gemini.embedding_model);
    println!("Embedding dimension: {}", config.gemini.embedding_dimension);
    println!("Default top_k: {}", config.search.default_top_k);
    println!("Overfetch factor: {}", config.search.overfetch_factor);
    println!(
        "API key: {}",
        if config.gemini.resolve_api_key().is_some() {
            "configured"
        } else {
            "not set"
        }
    );
    Ok(())
}
