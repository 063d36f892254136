//! Error taxonomy for the retrieval system.
//!
//! Callers need to distinguish a few situations reliably: an operation
//! invoked before startup finished (`NotInitialized`), a file the pipeline
//! cannot handle (`UnsupportedFileType`, `EmptyDocument`), store-level
//! failures (`StoreConnection`, `Schema`, `QueryExecution`), and the
//! readiness wait expiring (`Timeout`). An empty search result is never an
//! error.

use std::path::PathBuf;
use std::time::Duration;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// An operation was invoked before the owning component became ready
    #[error("{component} not initialized: wait for startup to complete")]
    NotInitialized { component: &'static str },

    /// No loader is registered for the file's extension
    #[error("unsupported file type: {extension:?} ({path})", path = .path.display())]
    UnsupportedFileType {
        path: PathBuf,
        extension: Option<String>,
    },

    /// The loader produced no usable text segments
    #[error("document is empty: {path}", path = .path.display())]
    EmptyDocument { path: PathBuf },

    /// Embedding layer failure (initialization or generation)
    #[error(transparent)]
    Embedding(#[from] lodestone_embed::EmbedError),

    /// Opening the store connection or creating the storage directory failed
    #[error("store connection failed: {message}")]
    StoreConnection {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// The provider's embedding dimension does not match the stored schema
    #[error("schema dimension mismatch: table was created for {expected}, provider produces {actual}")]
    Schema { expected: usize, actual: usize },

    /// A query against the chunk table failed
    #[error("query execution failed: {source}")]
    QueryExecution {
        #[from]
        source: sqlx::Error,
    },

    /// The readiness wait elapsed before the system became ready
    #[error("timed out after {waited:?} waiting for readiness")]
    Timeout { waited: Duration },

    /// Filesystem errors while reading documents or watching directories
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Filesystem watcher errors
    #[error("watch error: {source}")]
    Watch {
        #[from]
        source: notify::Error,
    },

    /// Async task join errors
    #[error("async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Startup failed earlier and the failure is latched until reset()
    #[error("initialization previously failed: {message}")]
    InitializationFailed { message: String },
}

impl RetrieverError {
    pub fn not_initialized(component: &'static str) -> Self {
        Self::NotInitialized { component }
    }

    pub fn store_connection(message: impl Into<String>, source: Option<sqlx::Error>) -> Self {
        Self::StoreConnection {
            message: message.into(),
            source,
        }
    }
}
