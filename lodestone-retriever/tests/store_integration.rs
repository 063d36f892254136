//! Store-level tests that need enough rows to train the approximate
//! index, plus the batching behavior of bulk upserts.

mod common;

use chrono::Utc;
use common::StubProvider;
use lodestone_retriever::policy::{DistanceMetric, IndexType, RetrievalConfig};
use lodestone_retriever::store::{ChunkFilter, DocumentChunk, VectorStore};
use std::sync::Arc;

fn synthetic_chunk(i: usize) -> DocumentChunk {
    let doc_id = format!("doc_{i:012x}");
    let file_type = if i % 2 == 0 { "txt" } else { "md" };
    let now = Utc::now();
    DocumentChunk {
        chunk_id: DocumentChunk::chunk_id_for(&doc_id, 0),
        document_id: doc_id,
        chunk_index: 0,
        content: format!("synthetic passage {i} covering topic {}", i % 7),
        filename: format!("file{i}.{file_type}"),
        title: format!("File {i}"),
        file_type: file_type.to_string(),
        file_path: format!("/corpus/file{i}.{file_type}"),
        language: "en".to_string(),
        file_size: 100,
        created_at: now,
        updated_at: now,
        file_hash: "0".repeat(64),
        page_number: 0,
        start_index: 0,
        end_index: 10,
    }
}

async fn ready_store(dir: &std::path::Path) -> anyhow::Result<(Arc<StubProvider>, VectorStore)> {
    let provider = Arc::new(StubProvider::new());
    use lodestone_embed::EmbeddingProvider;
    provider.initialize().await?;
    let store = VectorStore::new(dir.join("store.db"), provider.clone());
    store.initialize().await?;
    Ok((provider, store))
}

#[tokio::test]
async fn test_approximate_search_through_trained_index() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (_provider, store) = ready_store(dir.path()).await?;

    // Enough rows to train the index
    let chunks: Vec<DocumentChunk> = (0..300).map(synthetic_chunk).collect();
    assert_eq!(store.upsert_chunks(&chunks).await?, 300);

    let config = RetrievalConfig {
        index_type: IndexType::Approximate,
        k: 10,
        distance_metric: DistanceMetric::Cosine,
        refine_factor: 2,
    };

    // Querying a stored chunk's exact content must rank it first: its
    // vector is identical to the query, so it survives both the index
    // candidate cut and the exact re-rank
    let target = &chunks[151];
    let results = store
        .similarity_search(&target.content, config, &ChunkFilter::default())
        .await?;
    assert!(!results.is_empty() && results.len() <= 10);
    assert_eq!(results[0].chunk.chunk_id, target.chunk_id);
    assert!(results[0].score > 0.98, "score was {}", results[0].score);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    // The lazy rebuild triggered by the search trained over every row
    assert_eq!(store.stats().await?.indexed_rows, Some(300));

    // Filters apply on top of the index candidates
    let md_only = ChunkFilter::default().with_file_types(vec!["md".into()]);
    let results = store
        .similarity_search(&target.content, config, &md_only)
        .await?;
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.chunk.file_type == "md"));
    assert_eq!(results[0].chunk.chunk_id, target.chunk_id);

    store.close().await;
    Ok(())
}

#[tokio::test]
async fn test_upsert_bounds_embedding_concurrency() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (provider, store) = ready_store(dir.path()).await?;

    // Three batches worth of chunks
    let chunks: Vec<DocumentChunk> = (0..120).map(synthetic_chunk).collect();
    assert_eq!(store.upsert_chunks(&chunks).await?, 120);

    let max = provider.max_in_flight();
    // Embeddings fan out within a batch...
    assert!(max >= 2, "no fan-out observed, max in flight was {max}");
    // ...but batches run one after another, so in-flight calls never
    // exceed one batch of 50
    assert!(max <= 50, "batches overlapped, max in flight was {max}");

    store.close().await;
    Ok(())
}
