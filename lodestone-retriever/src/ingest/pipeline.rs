//! Ingestion pipeline: one file in, stored chunks out.
//!
//! The pipeline owns the full path from a filesystem path to rows in the
//! [`VectorStore`]: stable document identity, content hashing, loading,
//! metadata derivation, chunking, and the delete-then-insert write that
//! makes reprocessing idempotent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{Result, RetrieverError};
use crate::ingest::loader::{LoaderRegistry, Segment, extension_of};
use crate::store::{DocumentChunk, VectorStore};
use lodestone_context::TextSplitter;

/// Derive the stable document id for a path.
///
/// The id is `doc_` plus the first 12 hex digits of the blake3 hash of the
/// absolute path string. It depends only on the path, never the content,
/// so it can be computed for a file that no longer exists - which is
/// exactly what deletion handling needs. The path is absolutized
/// lexically, without touching the filesystem.
pub fn document_id(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path)?;
    let hash = blake3::hash(absolute.to_string_lossy().as_bytes());
    Ok(format!("doc_{}", &hash.to_hex()[..12]))
}

/// Derive a human-readable title from a file stem.
///
/// Underscores and hyphens become spaces, camelCase boundaries split, and
/// each word is title-cased: `user_guideV2` becomes `User Guide V2`.
pub fn humanize_title(stem: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in stem.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && current.chars().last().is_some_and(|p| p.is_lowercase()) {
            words.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns files into stored, embedded chunks.
pub struct IngestionPipeline {
    registry: LoaderRegistry,
    splitter: TextSplitter,
    store: Arc<VectorStore>,
}

impl IngestionPipeline {
    pub fn new(registry: LoaderRegistry, splitter: TextSplitter, store: Arc<VectorStore>) -> Self {
        Self {
            registry,
            splitter,
            store,
        }
    }

    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    /// Process one file end to end. Returns the number of chunks stored.
    ///
    /// Any previously stored chunks for the same document id are deleted
    /// first, so processing the same path twice leaves exactly one copy.
    /// Fails with [`RetrieverError::UnsupportedFileType`] for unregistered
    /// extensions and [`RetrieverError::EmptyDocument`] when the loader
    /// finds no usable text.
    pub async fn process_document(&self, path: &Path) -> Result<usize> {
        let doc_id = document_id(path)?;
        let loader = self.registry.loader_for(path)?;

        let content = tokio::fs::read(path).await?;
        let file_hash = blake3::hash(&content).to_hex().to_string();
        let file_size = content.len() as u64;
        drop(content);

        let segments = loader.load(path).await?;
        if segments.iter().all(|s| s.text.trim().is_empty()) {
            return Err(RetrieverError::EmptyDocument {
                path: path.to_path_buf(),
            });
        }

        let chunks = self.build_chunks(path, &doc_id, &file_hash, file_size, &segments);
        if chunks.is_empty() {
            return Err(RetrieverError::EmptyDocument {
                path: path.to_path_buf(),
            });
        }

        self.store.delete_document(&doc_id).await?;
        let written = self.store.upsert_chunks(&chunks).await?;

        info!(
            path = %path.display(),
            document_id = %doc_id,
            chunks = written,
            "processed document"
        );
        Ok(written)
    }

    /// Remove a document from the store by path. Returns the number of
    /// chunks removed; unknown paths remove nothing and succeed.
    pub async fn delete_document(&self, path: &Path) -> Result<u64> {
        let doc_id = document_id(path)?;
        let removed = self.store.delete_document(&doc_id).await?;
        debug!(path = %path.display(), document_id = %doc_id, removed, "deleted document");
        Ok(removed)
    }

    fn build_chunks(
        &self,
        path: &Path,
        doc_id: &str,
        file_hash: &str,
        file_size: u64,
        segments: &[Segment],
    ) -> Vec<DocumentChunk> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());
        let file_type = extension_of(path).unwrap_or_default();
        let file_path = file_path_string(path);

        // Format-supplied metadata wins over derived fallbacks
        let title = segments
            .iter()
            .find_map(|s| s.metadata.title.clone())
            .unwrap_or_else(|| humanize_title(&stem));
        let language = segments
            .iter()
            .find_map(|s| s.metadata.language.clone())
            .unwrap_or_else(|| "en".to_string());

        let now = Utc::now();
        let multi_page = segments.len() > 1;
        let mut chunks = Vec::new();
        let mut chunk_index = 0usize;

        for (position, segment) in segments.iter().enumerate() {
            let page_number = segment.metadata.page_number.unwrap_or(if multi_page {
                position as u32 + 1
            } else {
                0
            });

            for span in self.splitter.split(&segment.text) {
                chunks.push(DocumentChunk {
                    chunk_id: DocumentChunk::chunk_id_for(doc_id, chunk_index),
                    document_id: doc_id.to_string(),
                    chunk_index,
                    content: span.text,
                    filename: filename.clone(),
                    title: title.clone(),
                    file_type: file_type.clone(),
                    file_path: file_path.clone(),
                    language: language.clone(),
                    file_size,
                    created_at: now,
                    updated_at: now,
                    file_hash: file_hash.to_string(),
                    page_number,
                    start_index: span.start_index,
                    end_index: span.end_index,
                });
                chunk_index += 1;
            }
        }

        chunks
    }
}

fn file_path_string(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_stable_and_formatted() {
        let a = document_id(Path::new("/data/docs/guide.txt")).unwrap();
        let b = document_id(Path::new("/data/docs/guide.txt")).unwrap();
        let c = document_id(Path::new("/data/docs/other.txt")).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("doc_"));
        assert_eq!(a.len(), 4 + 12);
        assert!(a[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_document_id_survives_missing_files() {
        // No filesystem access: the path does not need to exist
        let id = document_id(Path::new("/definitely/not/a/real/file.txt")).unwrap();
        assert!(id.starts_with("doc_"));
    }

    #[test]
    fn test_relative_and_absolute_paths_agree() {
        let cwd = std::env::current_dir().unwrap();
        let relative = document_id(Path::new("notes.txt")).unwrap();
        let absolute = document_id(&cwd.join("notes.txt")).unwrap();
        assert_eq!(relative, absolute);
    }

    #[test]
    fn test_humanize_title() {
        assert_eq!(humanize_title("user_guide"), "User Guide");
        assert_eq!(humanize_title("api-reference"), "Api Reference");
        assert_eq!(humanize_title("gettingStarted"), "Getting Started");
        assert_eq!(humanize_title("README"), "README");
        assert_eq!(humanize_title("release_notesV2"), "Release Notes V2");
    }
}
