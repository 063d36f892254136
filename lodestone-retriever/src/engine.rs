//! The document engine: wiring and lifecycle for the whole system.
//!
//! [`DocumentEngine`] owns the embedding provider, the vector store, the
//! ingestion pipeline, the directory watcher, and the readiness
//! orchestrator, and is the only type callers need. Every operation is
//! gated on readiness: until [`initialize`](DocumentEngine::initialize)
//! completes, calls fail fast instead of operating on half-built state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{Result, RetrieverError};
use crate::ingest::loader::LoaderRegistry;
use crate::ingest::pipeline::IngestionPipeline;
use crate::ingest::watcher::{DirectoryWatcher, should_watch};
use crate::policy::{RetrievalConfig, retrieval_config_for};
use crate::readiness::{InitializationState, ReadinessOrchestrator, ServiceReadinessStatus};
use crate::store::{ChunkFilter, DocumentMetadata, SearchResult, StoreStats, VectorStore};
use lodestone_context::TextSplitter;
use lodestone_embed::{EmbeddingProvider, FastEmbedProvider};

struct EngineCore {
    store: Arc<VectorStore>,
    pipeline: Arc<IngestionPipeline>,
}

fn build_core(config: &EngineConfig, provider: &Arc<dyn EmbeddingProvider>) -> EngineCore {
    let store = Arc::new(VectorStore::new(
        config.store_path.clone(),
        Arc::clone(provider),
    ));
    let splitter = TextSplitter::with_defaults(config.chunk_size, config.chunk_overlap);
    let pipeline = Arc::new(IngestionPipeline::new(
        LoaderRegistry::with_defaults(),
        splitter,
        Arc::clone(&store),
    ));
    EngineCore { store, pipeline }
}

/// Top-level handle over ingestion, storage and search.
pub struct DocumentEngine {
    config: EngineConfig,
    provider: Arc<dyn EmbeddingProvider>,
    core: tokio::sync::RwLock<EngineCore>,
    watcher: tokio::sync::Mutex<Option<DirectoryWatcher>>,
    readiness: ReadinessOrchestrator,
}

impl DocumentEngine {
    /// Engine with the default FastEmbed provider.
    pub fn new(config: EngineConfig) -> Self {
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::new(FastEmbedProvider::new(config.embed_config.clone()));
        Self::with_provider(config, provider)
    }

    /// Engine with a caller-supplied embedding provider.
    pub fn with_provider(config: EngineConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let core = build_core(&config, &provider);
        Self {
            config,
            provider,
            core: tokio::sync::RwLock::new(core),
            watcher: tokio::sync::Mutex::new(None),
            readiness: ReadinessOrchestrator::new(),
        }
    }

    /// Bring every component up, in dependency order.
    ///
    /// Steps: embedding provider (model load and warm-up), vector store
    /// (schema and index), then the document roots (one-shot scan, plus
    /// live watches when enabled). The first failing step latches the
    /// engine as failed; concurrent callers serialize on the attempt and
    /// observe its outcome. Initializing a ready engine is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.readiness.begin_initialization().await;

        match self.readiness.state() {
            InitializationState::Complete => return Ok(()),
            InitializationState::Failed(message) => {
                return Err(RetrieverError::InitializationFailed { message });
            }
            InitializationState::Pending => {}
        }

        self.readiness
            .run_step("embedding_provider", async {
                self.provider.initialize().await?;
                Ok(())
            })
            .await?;

        let core = self.core.read().await;

        self.readiness
            .run_step("vector_store", core.store.initialize())
            .await?;

        self.readiness
            .run_step("ingestion_pipeline", async {
                if self.config.chunk_overlap >= self.config.chunk_size {
                    return Err(RetrieverError::InitializationFailed {
                        message: format!(
                            "chunk overlap {} must be smaller than chunk size {}",
                            self.config.chunk_overlap, self.config.chunk_size
                        ),
                    });
                }
                Ok(())
            })
            .await?;

        self.readiness
            .run_step("document_roots", async {
                if self.config.watch_enabled {
                    let watcher = DirectoryWatcher::new(
                        Arc::clone(&core.pipeline),
                        self.config.watcher.clone(),
                    );
                    for root in &self.config.document_roots {
                        watcher.watch_directory(root).await?;
                    }
                    *self.watcher.lock().await = Some(watcher);
                } else {
                    for root in &self.config.document_roots {
                        self.scan_root_once(&core.pipeline, root).await?;
                    }
                }
                Ok(())
            })
            .await?;

        self.readiness.mark_complete();
        info!("document engine ready");
        Ok(())
    }

    /// Process every matching file under a root, without watching it.
    /// Per-file failures are logged, not propagated.
    async fn scan_root_once(&self, pipeline: &IngestionPipeline, root: &Path) -> Result<()> {
        let walker = ignore::WalkBuilder::new(root)
            .max_depth(Some(self.config.watcher.max_depth))
            .build();
        for entry in walker {
            let entry = entry.map_err(|e| RetrieverError::Io {
                source: std::io::Error::other(e),
            })?;
            let path = entry.into_path();
            if path.is_file() && should_watch(&path, root, &self.config.watcher) {
                if let Err(e) = pipeline.process_document(&path).await {
                    warn!("skipping {}: {e}", path.display());
                }
            }
        }
        Ok(())
    }

    /// Ingest or re-ingest one file. Returns the number of chunks stored.
    pub async fn process_document(&self, path: &Path) -> Result<usize> {
        self.readiness.ensure_ready()?;
        let core = self.core.read().await;
        core.pipeline.process_document(path).await
    }

    /// Remove a document by path. Returns the number of chunks removed.
    pub async fn delete_document(&self, path: &Path) -> Result<u64> {
        self.readiness.ensure_ready()?;
        let core = self.core.read().await;
        core.pipeline.delete_document(path).await
    }

    /// Similarity search with explicit retrieval tuning.
    pub async fn similarity_search(
        &self,
        query: &str,
        config: RetrievalConfig,
        filter: &ChunkFilter,
    ) -> Result<Vec<SearchResult>> {
        self.readiness.ensure_ready()?;
        let core = self.core.read().await;
        core.store.similarity_search(query, config, filter).await
    }

    /// Similarity search tuned by an intent label. Unknown labels use the
    /// factual retrieval configuration.
    pub async fn search_with_intent(
        &self,
        query: &str,
        intent: &str,
        filter: &ChunkFilter,
    ) -> Result<Vec<SearchResult>> {
        self.similarity_search(query, retrieval_config_for(intent), filter)
            .await
    }

    pub async fn documents_metadata(&self) -> Result<Vec<DocumentMetadata>> {
        self.readiness.ensure_ready()?;
        let core = self.core.read().await;
        core.store.get_documents_metadata().await
    }

    pub async fn document_metadata(&self, document_id: &str) -> Result<Option<DocumentMetadata>> {
        self.readiness.ensure_ready()?;
        let core = self.core.read().await;
        core.store.get_document_metadata(document_id).await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.readiness.ensure_ready()?;
        let core = self.core.read().await;
        core.store.stats().await
    }

    /// Block until the engine is ready, a startup failure is observed, or
    /// the timeout elapses.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
        self.readiness.wait_for_ready(timeout).await
    }

    pub fn state(&self) -> InitializationState {
        self.readiness.state()
    }

    pub fn service_statuses(&self) -> Vec<ServiceReadinessStatus> {
        self.readiness.service_statuses()
    }

    /// Discard the latched readiness state and rebuild the store and
    /// pipeline, allowing a fresh [`initialize`](Self::initialize) after a
    /// failure or shutdown.
    pub async fn reset(&self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.stop_watching();
        }
        let mut core = self.core.write().await;
        core.store.close().await;
        *core = build_core(&self.config, &self.provider);
        self.readiness.reset();
    }

    /// Stop watching and close the store. The store and pipeline are
    /// rebuilt so a later [`initialize`](Self::initialize) starts from a
    /// fresh pool instead of the closed one.
    pub async fn shutdown(&self) {
        self.reset().await;
        info!("document engine shut down");
    }
}
