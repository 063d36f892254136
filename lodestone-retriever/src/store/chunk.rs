//! Chunk schema types shared between the store, the pipeline and callers.
//!
//! [`DocumentChunk`] is the one concrete record shape in the system: the
//! pipeline produces it, the store persists it (plus an embedding blob),
//! and searches return it. Document-level metadata is denormalized onto
//! every chunk so a search hit is self-describing without a join.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit of storage and retrieval.
///
/// Invariants maintained by the pipeline: all chunks of one document share
/// `document_id`, `file_hash` and `file_path`; `chunk_index` is dense and
/// 0-based across the whole document; `start_index`/`end_index` are byte
/// offsets into the chunk's source segment and are monotonically
/// non-decreasing within a page. Chunks are never mutated in place - a
/// changed file is deleted by `document_id` and fully re-inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique id, `{document_id}_chunk{n}`
    pub chunk_id: String,
    /// Stable id derived from the source path
    pub document_id: String,
    /// 0-based position of this chunk within its document
    pub chunk_index: usize,
    /// The chunk text
    pub content: String,
    pub filename: String,
    pub title: String,
    /// Lowercased file extension, e.g. "txt"
    pub file_type: String,
    pub file_path: String,
    pub language: String,
    /// Source file size in bytes
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Blake3 hash of the file content (hex); recorded for future change
    /// detection, not currently compared
    pub file_hash: String,
    /// 1-based page for multi-page sources, 0 for single-segment documents
    pub page_number: u32,
    /// Byte offset of the chunk start within its source segment
    pub start_index: usize,
    /// Byte offset one past the chunk end within its source segment
    pub end_index: usize,
}

impl DocumentChunk {
    /// Compose the chunk id for a document and position.
    pub fn chunk_id_for(document_id: &str, index: usize) -> String {
        format!("{document_id}_chunk{index}")
    }
}

/// Conjunctive search filters. Omitted fields are unconstrained, and an
/// empty allow-list means "no constraint", never "match nothing".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkFilter {
    /// Restrict to these document ids
    pub document_ids: Vec<String>,
    /// Restrict to these file types (extensions)
    pub file_types: Vec<String>,
    /// Exact language match
    pub language: Option<String>,
    /// Inclusive lower bound on creation time
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on creation time
    pub created_before: Option<DateTime<Utc>>,
}

impl ChunkFilter {
    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
            && self.file_types.is_empty()
            && self.language.is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
    }

    pub fn with_document_ids(mut self, ids: Vec<String>) -> Self {
        self.document_ids = ids;
        self
    }

    pub fn with_file_types(mut self, types: Vec<String>) -> Self {
        self.file_types = types;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// One similarity search hit: the chunk plus a normalized score in [0, 1],
/// higher meaning more similar.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Document-level view aggregated from that document's chunks.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMetadata {
    pub document_id: String,
    pub filename: String,
    pub title: String,
    pub file_type: String,
    pub file_path: String,
    pub language: String,
    pub file_size: u64,
    pub file_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunk_count: usize,
}
