//! Chunk storage: schema types, the SQLite store, and the approximate index.

pub mod ann;
pub mod chunk;
pub mod vector_store;

pub use ann::{IndexParams, MIN_INDEX_ROWS, VectorIndex};
pub use chunk::{ChunkFilter, DocumentChunk, DocumentMetadata, SearchResult};
pub use vector_store::{StoreState, StoreStats, VectorStore};
