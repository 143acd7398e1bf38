use anyhow::Result;
use clap::{Parser, Subcommand};
use rag_query::commands::{add_chunk, clear_store, search, show_config, show_info};
use rag_query::config::Config;

#[derive(Parser)]
#[command(name = "rag-query")]
#[command(about = "A RAG query service storing text chunks with embedding vectors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active configuration
    Config,
    /// Embed and store a chunk of content
    Add {
        /// Text content of the chunk
        content: String,
        /// Optional document grouping key
        #[arg(long)]
        document_id: Option<String>,
        /// Optional position of the chunk within its document
        #[arg(long)]
        chunk_index: Option<u32>,
        /// Metadata entries as key=value pairs (repeatable)
        #[arg(long = "meta")]
        metadata: Vec<String>,
    },
    /// Search stored chunks by semantic similarity
    Search {
        /// Query text
        query: String,
        /// Similarity metric: cosine, l2, or inner_product
        #[arg(long, default_value = "cosine")]
        search_type: String,
        /// Number of results to return
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum similarity for a result to be kept
        #[arg(long)]
        threshold: Option<f32>,
        /// Metadata filters as key=value pairs (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Re-score an over-fetched candidate set with fresh embeddings
        #[arg(long)]
        rerank: bool,
    },
    /// Show chunk count, vector dimension, and storage location
    Info,
    /// Delete every stored chunk and vector
    Clear,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load_default()?;

    match cli.command {
        Commands::Config => {
            show_config(&config)?;
        }
        Commands::Add {
            content,
            document_id,
            chunk_index,
            metadata,
        } => {
            add_chunk(&config, content, document_id, chunk_index, &metadata)?;
        }
        Commands::Search {
            query,
            search_type,
            top_k,
            threshold,
            filters,
            rerank,
        } => {
            search(
                &config,
                &query,
                &search_type,
                top_k,
                threshold,
                &filters,
                rerank,
            )?;
        }
        Commands::Info => {
            show_info(&config)?;
        }
        Commands::Clear => {
            clear_store(&config)?;
        }
    }

    Ok(())
}
