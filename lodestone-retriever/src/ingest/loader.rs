//! Document loaders: file bytes in, text segments out.
//!
//! A loader turns one file into an ordered list of [`Segment`]s, each an
//! independent unit of text (a page, usually) with whatever metadata the
//! format can supply. The [`LoaderRegistry`] maps file extensions to
//! loaders; files without a registered loader are rejected up front with
//! [`RetrieverError::UnsupportedFileType`] instead of producing junk
//! chunks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, RetrieverError};

/// Format-level metadata a loader can extract for a segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentMetadata {
    /// Document title, when the format carries one
    pub title: Option<String>,
    /// Content language, when the format declares it
    pub language: Option<String>,
    /// Explicit page number (1-based), when the format has real pages
    pub page_number: Option<u32>,
}

/// One extracted unit of text, in document order.
#[derive(Debug, Clone)]
pub struct Segment {
    pub text: String,
    pub metadata: SegmentMetadata,
}

impl Segment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: SegmentMetadata::default(),
        }
    }
}

/// Extracts text segments from one file format.
#[async_trait]
pub trait DocumentLoader: Send + Sync + std::fmt::Debug {
    async fn load(&self, path: &Path) -> Result<Vec<Segment>>;

    /// Extensions (lowercase, no dot) this loader handles
    fn extensions(&self) -> &[&'static str];
}

/// Plain text. Form feed characters split the file into pages, matching
/// how paginated exports of text documents mark page breaks.
#[derive(Debug)]
pub struct TextLoader;

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Segment>> {
        let content = tokio::fs::read_to_string(path).await?;
        let paged = content.contains('\u{0C}');
        // Number pages before dropping blank ones, so a blank page leaves
        // a gap instead of renumbering everything after it
        let segments = content
            .split('\u{0C}')
            .enumerate()
            .filter(|(_, page)| !page.trim().is_empty())
            .map(|(i, page)| Segment {
                text: page.to_string(),
                metadata: SegmentMetadata {
                    page_number: paged.then_some(i as u32 + 1),
                    ..Default::default()
                },
            })
            .collect();
        Ok(segments)
    }

    fn extensions(&self) -> &[&'static str] {
        &["txt", "log"]
    }
}

/// Markdown. The whole file is one segment; the first level-one heading
/// becomes the title.
#[derive(Debug)]
pub struct MarkdownLoader;

#[async_trait]
impl DocumentLoader for MarkdownLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Segment>> {
        let content = tokio::fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(vec![]);
        }

        let title = content
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix("# "))
            .map(|heading| heading.trim().to_string());

        Ok(vec![Segment {
            text: content,
            metadata: SegmentMetadata {
                title,
                ..Default::default()
            },
        }])
    }

    fn extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }
}

/// JSON. The document is re-rendered as indented text so nested values
/// stay searchable; a top-level string field named `title` becomes the
/// title.
#[derive(Debug)]
pub struct JsonLoader;

#[async_trait]
impl DocumentLoader for JsonLoader {
    async fn load(&self, path: &Path) -> Result<Vec<Segment>> {
        let content = tokio::fs::read_to_string(path).await?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            RetrieverError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid JSON in {}: {e}", path.display()),
                ),
            }
        })?;

        let title = value
            .get("title")
            .and_then(|t| t.as_str())
            .map(str::to_string);

        let text = serde_json::to_string_pretty(&value).map_err(|e| RetrieverError::Io {
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
        })?;

        Ok(vec![Segment {
            text,
            metadata: SegmentMetadata {
                title,
                ..Default::default()
            },
        }])
    }

    fn extensions(&self) -> &[&'static str] {
        &["json"]
    }
}

/// Extension-to-loader dispatch table.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in text, markdown and JSON loaders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextLoader));
        registry.register(Arc::new(MarkdownLoader));
        registry.register(Arc::new(JsonLoader));
        registry
    }

    pub fn register(&mut self, loader: Arc<dyn DocumentLoader>) {
        for extension in loader.extensions() {
            self.loaders
                .insert(extension.to_string(), Arc::clone(&loader));
        }
    }

    /// Extensions with a registered loader, unordered.
    pub fn supported_extensions(&self) -> Vec<String> {
        self.loaders.keys().cloned().collect()
    }

    pub fn supports(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.loaders.contains_key(&ext))
            .unwrap_or(false)
    }

    /// Resolve the loader for a path by its extension.
    pub fn loader_for(&self, path: &Path) -> Result<Arc<dyn DocumentLoader>> {
        let extension = extension_of(path);
        extension
            .as_ref()
            .and_then(|ext| self.loaders.get(ext))
            .cloned()
            .ok_or_else(|| RetrieverError::UnsupportedFileType {
                path: path.to_path_buf(),
                extension,
            })
    }
}

/// Lowercased extension of a path, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
