//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a result from a vector of f16 embeddings. The dimension is
    /// inferred from the first embedding; empty input yields dimension 0.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// Providers start cold: [`initialize`](Self::initialize) must complete
/// before the embedding methods succeed, and it is where any blocking model
/// load or download cost is paid. After initialization,
/// [`embedding_dimension`](Self::embedding_dimension) reports the true
/// model output dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Load the model and run one warm-up embedding
    async fn initialize(&self) -> Result<()>;

    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// FastEmbed-based embedding provider using local ONNX models.
///
/// The provider starts uninitialized; [`initialize`](EmbeddingProvider::initialize)
/// loads the model (downloading weights on first use) and runs one warm-up
/// embedding to confirm the model works and to discover the true output
/// dimension, which overrides the configured default. Embedding calls made
/// before that return [`EmbedError::NotInitialized`].
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Mutex<Option<Arc<Mutex<TextEmbedding>>>>,
    dimension: AtomicUsize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.lock().unwrap().is_some())
            .field("dimension", &self.dimension.load(Ordering::Relaxed))
            .finish()
    }
}

fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(EmbedError::invalid_config(format!(
            "unknown embedding model: {other}"
        ))),
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider.
    pub fn new(config: EmbedConfig) -> Self {
        let dimension = AtomicUsize::new(config.default_dimension);
        Self {
            config,
            model: Mutex::new(None),
            dimension,
        }
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    fn current_model(&self) -> Option<Arc<Mutex<TextEmbedding>>> {
        self.model.lock().unwrap().clone()
    }

    /// Convert f32 embeddings to normalized f16
    fn convert_to_f16(embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                embedding
                    .into_iter()
                    .map(|value| {
                        if norm > 0.0 {
                            f16::from_f32(value / norm)
                        } else {
                            f16::from_f32(value)
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    /// Loads the embedding model and runs the warm-up embedding.
    ///
    /// Model weights may be downloaded and cached on first use; that
    /// blocking cost is only paid here, never during embedding calls. The
    /// dimension observed from the warm-up call replaces the configured
    /// default. Initializing an already-initialized provider is a no-op.
    async fn initialize(&self) -> Result<()> {
        if self.current_model().is_some() {
            return Ok(());
        }

        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name()
        );

        let model_kind = resolve_model(self.config.model_name())?;

        // Load the model and warm it up in a blocking task
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options = InitOptions::new(model_kind).with_show_download_progress(false);

                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::ModelInitialization { source: e.into() })?;

                // Warm-up call doubles as the dimension probe
                let warmup = model
                    .embed(vec!["warm-up".to_string()], None)
                    .map_err(|e| EmbedError::ModelInitialization { source: e.into() })?;

                let dimension = warmup
                    .first()
                    .map(|emb| emb.len())
                    .filter(|len| *len > 0)
                    .ok_or_else(|| EmbedError::invalid_config("warm-up produced no embedding"))?;

                Ok((model, dimension))
            })
            .await??;

        if dimension != self.config.default_dimension {
            tracing::info!(
                "Model dimension {} overrides configured default {}",
                dimension,
                self.config.default_dimension
            );
        }

        *self.model.lock().unwrap() = Some(Arc::new(Mutex::new(model)));
        self.dimension.store(dimension, Ordering::Relaxed);

        tracing::info!("Model loaded successfully. Dimension: {}", dimension);
        Ok(())
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("no embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.current_model().ok_or(EmbedError::NotInitialized)?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.config.batch_size) {
            let chunk = chunk.to_vec();
            let model_clone = Arc::clone(&model);

            let batch_embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model_guard = model_clone.lock().unwrap();
                model_guard
                    .embed(chunk, None)
                    .map_err(|e| EmbedError::EmbeddingGeneration { source: e.into() })
            })
            .await??;

            all_embeddings.extend(Self::convert_to_f16(batch_embeddings));
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
