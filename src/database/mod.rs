// Database module
// Flat vector index and its ordinal-keyed chunk metadata side table

pub mod chunk_store;
pub mod vector_index;

pub use chunk_store::{Chunk, ChunkStore, NewChunk};
pub use vector_index::VectorIndex;
