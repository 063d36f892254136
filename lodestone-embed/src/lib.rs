//! # lodestone-embed
//!
//! Text embedding generation for the lodestone document retrieval system,
//! built on local ONNX models via FastEmbed.
//!
//! The provider lifecycle matters here: a [`FastEmbedProvider`] is created
//! cheaply, but embedding calls are rejected with
//! [`EmbedError::NotInitialized`] until [`EmbeddingProvider::initialize`]
//! has loaded the model and run a single warm-up embedding. The warm-up
//! serves two purposes: it proves the model is usable, and it discovers the
//! true output dimension, which overrides the configured default and is
//! what downstream storage schemas are sized from.
//!
//! Embeddings are L2-normalized and stored as half-precision (f16) vectors
//! to keep memory and storage costs down.
//!
//! ## Quick start
//!
//! ```no_run
//! use lodestone_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//! let result = provider.embed_texts(&["hello world".to_string()]).await?;
//! println!("dimension: {}", result.dimension);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod provider;

pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
