//! Engine configuration.

use std::path::{Path, PathBuf};

use crate::ingest::watcher::WatcherOptions;
use lodestone_embed::EmbedConfig;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Configuration for a [`DocumentEngine`](crate::engine::DocumentEngine).
///
/// Starts from a base directory; the store database lands inside it.
/// Document roots are separate - none are watched until added.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directories whose documents are ingested and watched
    pub document_roots: Vec<PathBuf>,
    /// SQLite database file path
    pub store_path: PathBuf,
    pub embed_config: EmbedConfig,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// When false, roots are scanned once at startup but not watched for
    /// changes
    pub watch_enabled: bool,
    pub watcher: WatcherOptions,
}

impl EngineConfig {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            document_roots: Vec::new(),
            store_path: base_dir.as_ref().join("lodestone.db"),
            embed_config: EmbedConfig::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            watch_enabled: true,
            watcher: WatcherOptions::default(),
        }
    }

    pub fn with_document_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.document_roots.push(root.into());
        self
    }

    pub fn with_embed_config(mut self, embed_config: EmbedConfig) -> Self {
        self.embed_config = embed_config;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_watch_enabled(mut self, enabled: bool) -> Self {
        self.watch_enabled = enabled;
        self
    }

    pub fn with_watcher_options(mut self, watcher: WatcherOptions) -> Self {
        self.watcher = watcher;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let config = EngineConfig::new("/data")
            .with_document_root("/docs/a")
            .with_document_root("/docs/b")
            .with_chunk_size(500)
            .with_chunk_overlap(50)
            .with_watch_enabled(false);

        assert_eq!(config.store_path, PathBuf::from("/data/lodestone.db"));
        assert_eq!(config.document_roots.len(), 2);
        assert_eq!(config.chunk_size, 500);
        assert!(!config.watch_enabled);
    }
}
