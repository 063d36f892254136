//! Shared test support: a deterministic embedding provider.

use async_trait::async_trait;
use half::f16;
use lodestone_embed::{EmbedError, EmbeddingProvider, EmbeddingResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[allow(dead_code)]
pub const STUB_DIMENSION: usize = 16;

/// Embedding provider producing hash-derived vectors: identical texts get
/// identical normalized vectors, different texts almost surely differ. No
/// model download, no blocking work.
pub struct StubProvider {
    initialized: AtomicBool,
    failures_remaining: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            failures_remaining: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Provider whose first `times` initialization attempts fail.
    #[allow(dead_code)]
    pub fn failing(times: usize) -> Self {
        let provider = Self::new();
        provider.failures_remaining.store(times, Ordering::SeqCst);
        provider
    }

    /// Highest number of `embed_text` calls observed in flight at once.
    #[allow(dead_code)]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn vector_for(text: &str) -> Vec<f16> {
    let mut state = 0xcbf2_9ce4_8422_2325u64;
    for &byte in text.as_bytes() {
        state = (state ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3);
    }

    let mut values = [0f32; STUB_DIMENSION];
    for value in values.iter_mut() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        *value = ((state >> 32) as f32 / u32::MAX as f32) - 0.5;
    }

    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    values
        .iter()
        .map(|x| f16::from_f32(x / norm))
        .collect()
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    async fn initialize(&self) -> lodestone_embed::Result<()> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(EmbedError::invalid_config("stub provider refused to start"));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn embed_text(&self, text: &str) -> lodestone_embed::Result<Vec<f16>> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(EmbedError::NotInitialized);
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        // Long enough that concurrent calls actually overlap
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let vector = vector_for(text);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vector)
    }

    async fn embed_texts(&self, texts: &[String]) -> lodestone_embed::Result<EmbeddingResult> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(EmbedError::NotInitialized);
        }
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| vector_for(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        STUB_DIMENSION
    }

    fn provider_name(&self) -> &str {
        "stub"
    }
}
