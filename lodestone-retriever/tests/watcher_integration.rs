//! Live-watching tests: files created, rewritten, and removed under a
//! watched root must converge into the store without explicit processing
//! calls.

mod common;

use common::StubProvider;
use lodestone_retriever::config::EngineConfig;
use lodestone_retriever::engine::DocumentEngine;
use lodestone_retriever::ingest::WatcherOptions;
use lodestone_retriever::store::ChunkFilter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn fast_watcher_options() -> WatcherOptions {
    WatcherOptions {
        debounce: Duration::from_millis(100),
        stability_poll: Duration::from_millis(10),
        stability_max_checks: 5,
        ..Default::default()
    }
}

fn watching_engine(store_dir: &Path, root: &Path) -> DocumentEngine {
    let config = EngineConfig::new(store_dir)
        .with_document_root(root)
        .with_watcher_options(fast_watcher_options());
    DocumentEngine::with_provider(config, Arc::new(StubProvider::new()))
}

/// Poll until the store holds `expected` documents, or give up after 10s.
async fn wait_for_document_count(engine: &DocumentEngine, expected: usize) -> bool {
    for _ in 0..100 {
        if let Ok(stats) = engine.stats().await
            && stats.document_count == expected
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_new_file_is_picked_up() -> anyhow::Result<()> {
    let store_dir = tempfile::tempdir()?;
    let root = tempfile::tempdir()?;
    let engine = watching_engine(store_dir.path(), root.path());
    engine.initialize().await?;
    engine.wait_for_ready(Duration::from_secs(10)).await?;

    std::fs::write(root.path().join("fresh.txt"), "a freshly created document")?;

    assert!(wait_for_document_count(&engine, 1).await);
    let documents = engine.documents_metadata().await?;
    assert_eq!(documents[0].filename, "fresh.txt");

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_write_burst_converges_to_final_content() -> anyhow::Result<()> {
    let store_dir = tempfile::tempdir()?;
    let root = tempfile::tempdir()?;
    let engine = watching_engine(store_dir.path(), root.path());
    engine.initialize().await?;
    engine.wait_for_ready(Duration::from_secs(10)).await?;

    let path = root.path().join("busy.txt");
    for i in 0..5 {
        std::fs::write(&path, format!("draft number {i}"))?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    std::fs::write(&path, "the final draft")?;

    assert!(wait_for_document_count(&engine, 1).await);

    // Allow any trailing debounced event to settle, then confirm exactly
    // one copy with the last content
    tokio::time::sleep(Duration::from_millis(500)).await;
    let results = engine
        .search_with_intent("the final draft", "factual_retrieval", &ChunkFilter::default())
        .await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.content, "the final draft");
    assert!(results[0].score > 0.98);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_removed_file_is_deleted_from_store() -> anyhow::Result<()> {
    let store_dir = tempfile::tempdir()?;
    let root = tempfile::tempdir()?;

    let path = root.path().join("transient.txt");
    std::fs::write(&path, "here today")?;

    let engine = watching_engine(store_dir.path(), root.path());
    engine.initialize().await?;
    engine.wait_for_ready(Duration::from_secs(10)).await?;

    // Picked up by the initial scan
    assert!(wait_for_document_count(&engine, 1).await);

    std::fs::remove_file(&path)?;
    assert!(wait_for_document_count(&engine, 0).await);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_skipping_the_initial_scan_only_sees_future_changes() -> anyhow::Result<()> {
    let store_dir = tempfile::tempdir()?;
    let root = tempfile::tempdir()?;

    std::fs::write(root.path().join("preexisting.txt"), "was already here")?;

    let options = WatcherOptions {
        initial_scan: false,
        ..fast_watcher_options()
    };
    let config = EngineConfig::new(store_dir.path())
        .with_document_root(root.path())
        .with_watcher_options(options);
    let engine = DocumentEngine::with_provider(config, Arc::new(StubProvider::new()));
    engine.initialize().await?;
    engine.wait_for_ready(Duration::from_secs(10)).await?;

    // The pre-existing file is never picked up
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(engine.stats().await?.document_count, 0);

    // A file created after the watch starts still is
    std::fs::write(root.path().join("later.txt"), "created after startup")?;
    assert!(wait_for_document_count(&engine, 1).await);
    let documents = engine.documents_metadata().await?;
    assert_eq!(documents[0].filename, "later.txt");

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_ignored_files_never_reach_the_store() -> anyhow::Result<()> {
    let store_dir = tempfile::tempdir()?;
    let root = tempfile::tempdir()?;

    std::fs::write(root.path().join("archive.zip"), [0u8; 8])?;
    std::fs::write(root.path().join(".hidden.txt"), "skipped")?;
    std::fs::write(root.path().join("kept.txt"), "the only real document")?;

    let engine = watching_engine(store_dir.path(), root.path());
    engine.initialize().await?;
    engine.wait_for_ready(Duration::from_secs(10)).await?;

    assert!(wait_for_document_count(&engine, 1).await);
    let documents = engine.documents_metadata().await?;
    assert_eq!(documents[0].filename, "kept.txt");

    engine.shutdown().await;
    Ok(())
}
