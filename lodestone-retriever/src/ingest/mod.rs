//! Ingestion: loaders, the chunking pipeline, debouncing, and watching.

pub mod debounce;
pub mod loader;
pub mod pipeline;
pub mod watcher;

pub use debounce::KeyedDebouncer;
pub use loader::{DocumentLoader, JsonLoader, LoaderRegistry, MarkdownLoader, Segment,
    SegmentMetadata, TextLoader};
pub use pipeline::{IngestionPipeline, document_id, humanize_title};
pub use watcher::{DirectoryWatcher, WatcherOptions, should_watch};
