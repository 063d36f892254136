//! Error types for the embedding layer.

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors produced while loading embedding models or generating embeddings.
///
/// `NotInitialized` is the distinguishable "called too early" case: the
/// provider rejects embedding requests until [`initialize`] has completed
/// its warm-up call.
///
/// [`initialize`]: crate::provider::EmbeddingProvider::initialize
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// An embedding was requested before the model finished loading
    #[error("embedding provider not initialized: call initialize() first")]
    NotInitialized,

    /// The model configuration is invalid or names an unknown model
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The model failed to load or its warm-up embedding failed
    #[error("model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The model failed while generating embeddings
    #[error("embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors while reading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("external error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Wrap an error that occurred during model loading or warm-up.
    pub fn model_init<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelInitialization {
            source: Box::new(source),
        }
    }

    /// Wrap an error that occurred while generating embeddings.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
