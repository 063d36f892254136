//! Configuration for embedding providers.

use serde::{Deserialize, Serialize};

/// Configuration for an embedding model.
///
/// The `default_dimension` is only a hint used before the model is loaded:
/// the real dimension is discovered from a warm-up embedding during
/// initialization and overrides whatever is configured here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedConfig {
    /// Model identifier, e.g. "all-minilm-l6-v2"
    pub model_name: String,
    /// Expected embedding dimension before warm-up discovery
    pub default_dimension: usize,
    /// Number of texts embedded per blocking model call
    pub batch_size: usize,
}

impl EmbedConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: "all-minilm-l6-v2".to_string(),
            default_dimension: 384,
            batch_size: 16,
        }
    }
}
