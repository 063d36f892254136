//! End-to-end tests over the document engine with a stub embedding
//! provider, covering ingestion, search, metadata, and the readiness
//! lifecycle.

mod common;

use common::{STUB_DIMENSION, StubProvider};
use lodestone_retriever::config::EngineConfig;
use lodestone_retriever::engine::DocumentEngine;
use lodestone_retriever::error::RetrieverError;
use lodestone_retriever::ingest::document_id;
use lodestone_retriever::policy::retrieval_config_for;
use lodestone_retriever::readiness::InitializationState;
use lodestone_retriever::store::ChunkFilter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn engine_in(dir: &Path) -> DocumentEngine {
    let config = EngineConfig::new(dir).with_watch_enabled(false);
    DocumentEngine::with_provider(config, Arc::new(StubProvider::new()))
}

#[tokio::test]
async fn test_three_page_document_chunking() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine_in(dir.path());
    engine.initialize().await?;

    // Three 2500-byte pages with no split points, forcing hard cuts with
    // overlap: each page yields spans 0..1000, 800..1800, 1600..2500
    let page = "x".repeat(2500);
    let path = dir.path().join("manual.txt");
    std::fs::write(&path, [page.as_str(); 3].join("\u{0C}"))?;

    let chunks = engine.process_document(&path).await?;
    assert_eq!(chunks, 9);

    let doc_id = document_id(&path)?;
    let metadata = engine.document_metadata(&doc_id).await?.unwrap();
    assert_eq!(metadata.chunk_count, 9);
    assert_eq!(metadata.filename, "manual.txt");
    assert_eq!(metadata.title, "Manual");
    assert_eq!(metadata.file_type, "txt");

    // Pull every chunk back through a document-filtered search
    let filter = ChunkFilter::default().with_document_ids(vec![doc_id.clone()]);
    let mut config = retrieval_config_for("factual_retrieval");
    config.k = 100;
    let results = engine.similarity_search("xxxx", config, &filter).await?;
    assert_eq!(results.len(), 9);

    let mut indices: Vec<usize> = results.iter().map(|r| r.chunk.chunk_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..9).collect::<Vec<_>>());

    let mut pages: Vec<u32> = results.iter().map(|r| r.chunk.page_number).collect();
    pages.sort_unstable();
    assert_eq!(pages, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);

    let mut page_one_spans: Vec<(usize, usize)> = results
        .iter()
        .filter(|r| r.chunk.page_number == 1)
        .map(|r| (r.chunk.start_index, r.chunk.end_index))
        .collect();
    page_one_spans.sort_unstable();
    assert_eq!(page_one_spans, vec![(0, 1000), (800, 1800), (1600, 2500)]);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_reprocessing_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine_in(dir.path());
    engine.initialize().await?;

    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "first paragraph\n\nsecond paragraph")?;

    let first = engine.process_document(&path).await?;
    let second = engine.process_document(&path).await?;
    assert_eq!(first, second);

    let stats = engine.stats().await?;
    assert_eq!(stats.document_count, 1);
    assert_eq!(stats.chunk_count, first);
    assert_eq!(stats.embedding_dimension, STUB_DIMENSION);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_delete_document_counts_and_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine_in(dir.path());
    engine.initialize().await?;

    let path = dir.path().join("doomed.txt");
    std::fs::write(&path, "short document")?;
    let stored = engine.process_document(&path).await?;

    assert_eq!(engine.delete_document(&path).await?, stored as u64);
    assert_eq!(engine.delete_document(&path).await?, 0);

    // A path never seen deletes nothing and still succeeds
    assert_eq!(
        engine
            .delete_document(Path::new("/never/ingested.txt"))
            .await?,
        0
    );

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_search_filters_and_exact_match_score() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine_in(dir.path());
    engine.initialize().await?;

    std::fs::write(dir.path().join("whales.txt"), "blue whale migration")?;
    std::fs::write(dir.path().join("birds.md"), "# Birds\narctic tern routes")?;
    engine
        .process_document(&dir.path().join("whales.txt"))
        .await?;
    engine
        .process_document(&dir.path().join("birds.md"))
        .await?;

    // Type filter excludes the text file entirely
    let md_only = ChunkFilter::default().with_file_types(vec!["md".into()]);
    let results = engine
        .search_with_intent("anything", "factual_retrieval", &md_only)
        .await?;
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.chunk.file_type == "md"));

    // The stub embeds identical text identically, so querying a chunk's
    // exact content must rank it first with a near-perfect score
    let results = engine
        .search_with_intent(
            "blue whale migration",
            "factual_retrieval",
            &ChunkFilter::default(),
        )
        .await?;
    assert_eq!(results[0].chunk.filename, "whales.txt");
    assert!(results[0].score > 0.98, "score was {}", results[0].score);

    // Scores come back descending
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    // An empty filter list constrains nothing
    let unfiltered = ChunkFilter::default().with_file_types(vec![]);
    let results = engine
        .search_with_intent("anything", "conceptual_exploration", &unfiltered)
        .await?;
    let types: std::collections::HashSet<_> =
        results.iter().map(|r| r.chunk.file_type.clone()).collect();
    assert_eq!(types.len(), 2);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unsupported_and_empty_documents_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine_in(dir.path());
    engine.initialize().await?;

    let binary = dir.path().join("image.png");
    std::fs::write(&binary, [0u8; 16])?;
    assert!(matches!(
        engine.process_document(&binary).await,
        Err(RetrieverError::UnsupportedFileType { .. })
    ));

    let empty = dir.path().join("empty.txt");
    std::fs::write(&empty, "   \n  \n")?;
    assert!(matches!(
        engine.process_document(&empty).await,
        Err(RetrieverError::EmptyDocument { .. })
    ));

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_operations_require_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let err = engine
        .process_document(Path::new("whatever.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, RetrieverError::NotInitialized { .. }));

    let err = engine
        .search_with_intent("q", "factual_retrieval", &ChunkFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RetrieverError::NotInitialized { .. }));
}

#[tokio::test]
async fn test_failed_startup_latches_until_reset() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = EngineConfig::new(dir.path()).with_watch_enabled(false);
    // First initialization attempt fails, the retry succeeds
    let engine = DocumentEngine::with_provider(config, Arc::new(StubProvider::failing(1)));

    assert!(engine.initialize().await.is_err());
    assert!(matches!(engine.state(), InitializationState::Failed(_)));

    // Re-initializing without reset reports the original failure
    assert!(matches!(
        engine.initialize().await,
        Err(RetrieverError::InitializationFailed { .. })
    ));

    // wait_for_ready fails fast rather than blocking on a dead system
    let started = std::time::Instant::now();
    assert!(matches!(
        engine.wait_for_ready(Duration::from_secs(10)).await,
        Err(RetrieverError::InitializationFailed { .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(1));

    engine.reset().await;
    assert_eq!(engine.state(), InitializationState::Pending);

    engine.initialize().await?;
    engine.wait_for_ready(Duration::from_secs(5)).await?;
    assert_eq!(engine.state(), InitializationState::Complete);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_reinitialize_after_shutdown() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine_in(dir.path());
    engine.initialize().await?;

    let path = dir.path().join("persistent.txt");
    std::fs::write(&path, "survives a restart")?;
    engine.process_document(&path).await?;

    engine.shutdown().await;
    assert_eq!(engine.state(), InitializationState::Pending);
    assert!(matches!(
        engine.stats().await,
        Err(RetrieverError::NotInitialized { .. })
    ));

    // A fresh initialize must come up cleanly against the same database
    engine.initialize().await?;
    assert_eq!(engine.state(), InitializationState::Complete);

    let stats = engine.stats().await?;
    assert_eq!(stats.document_count, 1);

    let results = engine
        .search_with_intent(
            "survives a restart",
            "factual_retrieval",
            &ChunkFilter::default(),
        )
        .await?;
    assert_eq!(results[0].chunk.filename, "persistent.txt");

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_documents_metadata_lists_everything() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine_in(dir.path());
    engine.initialize().await?;

    for name in ["a.txt", "b.txt", "c.md"] {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("content of {name}"))?;
        engine.process_document(&path).await?;
    }

    let documents = engine.documents_metadata().await?;
    assert_eq!(documents.len(), 3);
    let names: Vec<_> = documents.iter().map(|d| d.filename.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.md"]);
    assert!(documents.iter().all(|d| d.chunk_count > 0));

    assert!(engine.document_metadata("doc_000000000000").await?.is_none());

    engine.shutdown().await;
    Ok(())
}
