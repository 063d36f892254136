//! lodestone-retriever: Document ingestion, vector storage and search
//!
//! This crate turns directories of documents into an embedded, searchable
//! chunk store and keeps it synchronized with the filesystem. It composes
//! the chunking from `lodestone-context` and the embeddings from
//! `lodestone-embed` into a complete retrieval engine.
//!
//! ## Key Modules
//!
//! - **[`engine`]**: The [`DocumentEngine`](engine::DocumentEngine) - the
//!   top-level handle over everything below
//! - **[`ingest`]**: Document loaders, the chunking pipeline, debouncing,
//!   and directory watching
//! - **[`store`]**: SQLite-backed vector store with an in-memory
//!   approximate index
//! - **[`policy`]**: Intent-based retrieval tuning
//! - **[`readiness`]**: Startup state tracking with latched failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lodestone_retriever::config::EngineConfig;
//! use lodestone_retriever::engine::DocumentEngine;
//! use lodestone_retriever::store::ChunkFilter;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EngineConfig::new(".lodestone").with_document_root("./docs");
//! let engine = DocumentEngine::new(config);
//! engine.initialize().await?;
//!
//! let results = engine
//!     .search_with_intent("how do I configure logging?", "procedural_guidance",
//!         &ChunkFilter::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files → Loaders → Splitter → Embeddings → SQLite + ANN index
//!   ↑                                            ↓
//! DirectoryWatcher ← DocumentEngine ← Readiness ← Search APIs
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod policy;
pub mod readiness;
pub mod store;

pub use config::EngineConfig;
pub use engine::DocumentEngine;
pub use error::{Result, RetrieverError};
