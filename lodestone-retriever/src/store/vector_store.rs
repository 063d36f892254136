//! SQLite-backed vector store for document chunks.
//!
//! Chunks live in a single `chunks` table with their f16 embedding stored as
//! a blob alongside the denormalized document metadata, so one row answers a
//! search hit completely. A `store_meta` table pins the embedding dimension
//! the schema was created for; a provider producing a different dimension is
//! rejected at startup rather than discovered through garbage distances.
//!
//! ## SQLite configuration
//!
//! - WAL mode with normal synchronous writes for concurrent read/write
//! - 64KB pages, sized for embedding blob storage
//! - 5s busy timeout, full auto-vacuum, foreign keys on
//!
//! The approximate index ([`VectorIndex`]) is held in memory and rebuilt
//! lazily after writes; the SQLite file is the only persisted state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{Result, RetrieverError};
use crate::policy::{DistanceMetric, IndexType, RetrievalConfig};
use crate::store::ann::{IndexParams, VectorIndex};
use crate::store::chunk::{ChunkFilter, DocumentChunk, DocumentMetadata, SearchResult};
use lodestone_embed::EmbeddingProvider;

/// Rows inserted per transaction during bulk upsert.
const UPSERT_BATCH_SIZE: usize = 50;

/// Store lifecycle. Transitions only move forward except through a full
/// re-initialization of a new store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoreState {
    Uninitialized = 0,
    Connecting = 1,
    SchemaReady = 2,
    Ready = 3,
    Closed = 4,
}

impl StoreState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::SchemaReady,
            3 => Self::Ready,
            4 => Self::Closed,
            _ => Self::Uninitialized,
        }
    }
}

/// Aggregate counts reported by [`VectorStore::stats`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub document_count: usize,
    pub embedding_dimension: usize,
    /// Rows covered by the trained approximate index, if one exists
    pub indexed_rows: Option<usize>,
}

/// Document chunk store with embedding-based similarity search.
///
/// All query methods require [`initialize`](Self::initialize) to have
/// completed; before that they fail with
/// [`RetrieverError::NotInitialized`].
pub struct VectorStore {
    db_path: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    pool: OnceLock<SqlitePool>,
    dimension: OnceLock<usize>,
    state: AtomicU8,
    index: tokio::sync::RwLock<Option<VectorIndex>>,
    index_dirty: AtomicBool,
}

impl VectorStore {
    /// Create an unopened store backed by the SQLite file at `db_path`.
    ///
    /// The embedding provider must already be initialized; its reported
    /// dimension is checked against the stored schema during
    /// [`initialize`](Self::initialize).
    pub fn new(db_path: impl Into<PathBuf>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            db_path: db_path.into(),
            provider,
            pool: OnceLock::new(),
            dimension: OnceLock::new(),
            state: AtomicU8::new(StoreState::Uninitialized as u8),
            index: tokio::sync::RwLock::new(None),
            index_dirty: AtomicBool::new(true),
        }
    }

    pub fn state(&self) -> StoreState {
        StoreState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: StoreState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Open the database, create or validate the schema, and train the
    /// approximate index over any existing rows.
    pub async fn initialize(&self) -> Result<()> {
        if self.state() == StoreState::Ready {
            return Ok(());
        }
        self.set_state(StoreState::Connecting);

        if let Some(parent) = self.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RetrieverError::store_connection(
                    format!("cannot create storage directory {}: {e}", parent.display()),
                    None,
                )
            })?;
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&self.db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await
        .map_err(|e| {
            RetrieverError::store_connection(
                format!("cannot open {}", self.db_path.display()),
                Some(e),
            )
        })?;

        Self::create_tables(&pool).await?;
        self.set_state(StoreState::SchemaReady);

        let provider_dimension = self.provider.embedding_dimension();
        let stored_dimension = Self::read_schema_dimension(&pool).await?;
        match stored_dimension {
            Some(expected) if expected != provider_dimension => {
                return Err(RetrieverError::Schema {
                    expected,
                    actual: provider_dimension,
                });
            }
            Some(_) => {}
            None => {
                sqlx::query("INSERT INTO store_meta (key, value) VALUES ('embedding_dim', ?1)")
                    .bind(provider_dimension as i64)
                    .execute(&pool)
                    .await?;
            }
        }

        let _ = self.dimension.set(provider_dimension);
        let _ = self.pool.set(pool);

        self.rebuild_index().await?;
        self.set_state(StoreState::Ready);

        info!(
            path = %self.db_path.display(),
            dimension = provider_dimension,
            "vector store ready"
        );
        Ok(())
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_id TEXT NOT NULL UNIQUE,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                filename TEXT NOT NULL,
                title TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                language TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                file_hash TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                start_index INTEGER NOT NULL,
                end_index INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_type ON chunks(file_type)")
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn read_schema_dimension(pool: &SqlitePool) -> Result<Option<usize>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'embedding_dim'")
                .fetch_optional(pool)
                .await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    fn pool(&self) -> Result<&SqlitePool> {
        if self.state() != StoreState::Ready {
            return Err(RetrieverError::not_initialized("vector store"));
        }
        self.pool
            .get()
            .ok_or(RetrieverError::not_initialized("vector store"))
    }

    /// Embedding dimension the schema was created for. Zero before
    /// initialization.
    pub fn dimension(&self) -> usize {
        self.dimension.get().copied().unwrap_or(0)
    }

    /// Embed and insert chunks, replacing rows with matching chunk ids.
    ///
    /// Chunks are processed in batches of [`UPSERT_BATCH_SIZE`]: embeddings
    /// fan out concurrently within a batch, and each batch is embedded and
    /// committed before the next one starts, so peak memory and embedding
    /// concurrency stay bounded by one batch. Returns the number of rows
    /// written. The approximate index is marked stale rather than rebuilt
    /// here; the next approximate search pays the rebuild.
    pub async fn upsert_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        let pool = self.pool()?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut written = 0usize;
        for batch in chunks.chunks(UPSERT_BATCH_SIZE) {
            let embeddings = futures::future::try_join_all(
                batch
                    .iter()
                    .map(|chunk| self.provider.embed_text(&chunk.content)),
            )
            .await?;

            let mut tx = pool.begin().await?;
            for (chunk, embedding) in batch.iter().zip(embeddings) {
                let blob: &[u8] = bytemuck::cast_slice(&embedding);
                sqlx::query(
                    r#"
                    INSERT INTO chunks (
                        chunk_id, document_id, chunk_index, content,
                        filename, title, file_type, file_path, language,
                        file_size, created_at, updated_at, file_hash,
                        page_number, start_index, end_index, embedding
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                    ON CONFLICT(chunk_id) DO UPDATE SET
                        document_id = excluded.document_id,
                        chunk_index = excluded.chunk_index,
                        content = excluded.content,
                        filename = excluded.filename,
                        title = excluded.title,
                        file_type = excluded.file_type,
                        file_path = excluded.file_path,
                        language = excluded.language,
                        file_size = excluded.file_size,
                        created_at = excluded.created_at,
                        updated_at = excluded.updated_at,
                        file_hash = excluded.file_hash,
                        page_number = excluded.page_number,
                        start_index = excluded.start_index,
                        end_index = excluded.end_index,
                        embedding = excluded.embedding
                    "#,
                )
                .bind(&chunk.chunk_id)
                .bind(&chunk.document_id)
                .bind(chunk.chunk_index as i64)
                .bind(&chunk.content)
                .bind(&chunk.filename)
                .bind(&chunk.title)
                .bind(&chunk.file_type)
                .bind(&chunk.file_path)
                .bind(&chunk.language)
                .bind(chunk.file_size as i64)
                .bind(chunk.created_at.timestamp())
                .bind(chunk.updated_at.timestamp())
                .bind(&chunk.file_hash)
                .bind(chunk.page_number as i64)
                .bind(chunk.start_index as i64)
                .bind(chunk.end_index as i64)
                .bind(blob)
                .execute(&mut *tx)
                .await?;
                written += 1;
            }
            tx.commit().await?;
        }

        self.index_dirty.store(true, Ordering::Release);

        // Query planner maintenance is best-effort: a failure here must
        // never fail the write that triggered it.
        if let Err(e) = sqlx::query("PRAGMA optimize").execute(pool).await {
            warn!("PRAGMA optimize failed after upsert: {e}");
        }

        debug!(rows = written, "upserted chunks");
        Ok(written)
    }

    /// Delete every chunk of a document. Returns the number of rows
    /// removed; deleting an unknown document id is not an error and
    /// returns 0.
    pub async fn delete_document(&self, document_id: &str) -> Result<u64> {
        let pool = self.pool()?;
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            self.index_dirty.store(true, Ordering::Release);
            debug!(document_id, removed, "deleted document chunks");
        }
        Ok(removed)
    }

    /// Similarity search over the chunk table.
    ///
    /// Exact queries (and approximate queries while the table is below the
    /// index training threshold) scan every row matching the filter.
    /// Approximate queries probe the index for `k * refine_factor`
    /// candidates and exact-rank only those. Scores are normalized to
    /// [0, 1] per the configured metric, sorted descending, and truncated
    /// to `k`. An empty result is a valid outcome, never an error.
    pub async fn similarity_search(
        &self,
        query: &str,
        config: RetrievalConfig,
        filter: &ChunkFilter,
    ) -> Result<Vec<SearchResult>> {
        let pool = self.pool()?;

        let query_embedding: Vec<f32> = self
            .provider
            .embed_text(query)
            .await?
            .iter()
            .map(|x| x.to_f32())
            .collect();

        let rows = match config.index_type {
            IndexType::Exact => self.fetch_filtered(pool, filter, None).await?,
            IndexType::Approximate => {
                self.refresh_index().await?;
                let candidates = {
                    let index = self.index.read().await;
                    index.as_ref().map(|index| {
                        let fetch = config.k.saturating_mul(config.refine_factor.max(1));
                        index.search(&query_embedding, fetch)
                    })
                };
                match candidates {
                    Some(ids) if ids.is_empty() => Vec::new(),
                    Some(ids) => self.fetch_filtered(pool, filter, Some(&ids)).await?,
                    // Not enough rows to train: exact scan is cheap anyway
                    None => self.fetch_filtered(pool, filter, None).await?,
                }
            }
        };

        let mut results: Vec<SearchResult> = rows
            .into_iter()
            .map(|(chunk, embedding)| {
                let score = score_for(&query_embedding, &embedding, config.distance_metric);
                SearchResult { chunk, score }
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(config.k);
        Ok(results)
    }

    /// Fetch chunks matching the filter, optionally restricted to a
    /// candidate id set, decoding the embedding blob of each row.
    async fn fetch_filtered(
        &self,
        pool: &SqlitePool,
        filter: &ChunkFilter,
        candidate_ids: Option<&[i64]>,
    ) -> Result<Vec<(DocumentChunk, Vec<f32>)>> {
        let mut sql = String::from("SELECT * FROM chunks");
        let mut clauses: Vec<String> = Vec::new();
        let mut binds: Vec<BindValue> = Vec::new();

        if let Some(ids) = candidate_ids {
            clauses.push(format!("id IN ({})", placeholders(ids.len())));
            binds.extend(ids.iter().map(|&id| BindValue::Int(id)));
        }
        if !filter.document_ids.is_empty() {
            clauses.push(format!(
                "document_id IN ({})",
                placeholders(filter.document_ids.len())
            ));
            binds.extend(filter.document_ids.iter().cloned().map(BindValue::Text));
        }
        if !filter.file_types.is_empty() {
            clauses.push(format!(
                "file_type IN ({})",
                placeholders(filter.file_types.len())
            ));
            binds.extend(filter.file_types.iter().cloned().map(BindValue::Text));
        }
        if let Some(language) = &filter.language {
            clauses.push("language = ?".to_string());
            binds.push(BindValue::Text(language.clone()));
        }
        if let Some(after) = filter.created_after {
            clauses.push("created_at >= ?".to_string());
            binds.push(BindValue::Int(after.timestamp()));
        }
        if let Some(before) = filter.created_before {
            clauses.push("created_at <= ?".to_string());
            binds.push(BindValue::Int(before.timestamp()));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut query = sqlx::query(&sql);
        for bind in binds {
            query = match bind {
                BindValue::Text(s) => query.bind(s),
                BindValue::Int(i) => query.bind(i),
            };
        }

        let rows = query.fetch_all(pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(decode_row(&row)?);
        }
        Ok(out)
    }

    /// Retrain the approximate index if writes have happened since the last
    /// build. Below the training threshold the index is dropped and
    /// searches fall back to exact scans.
    async fn refresh_index(&self) -> Result<()> {
        if !self.index_dirty.load(Ordering::Acquire) {
            return Ok(());
        }
        self.rebuild_index().await
    }

    async fn rebuild_index(&self) -> Result<()> {
        let pool = self
            .pool
            .get()
            .ok_or(RetrieverError::not_initialized("vector store"))?;

        let rows = sqlx::query("SELECT id, embedding FROM chunks")
            .fetch_all(pool)
            .await?;

        let params = IndexParams::for_table(rows.len(), self.dimension());
        let rebuilt = match params {
            Some(params) => {
                let mut ids = Vec::with_capacity(rows.len());
                let mut vectors = Vec::with_capacity(rows.len());
                for row in &rows {
                    ids.push(row.try_get::<i64, _>("id")?);
                    vectors.push(decode_embedding(row.try_get("embedding")?));
                }
                debug!(
                    rows = ids.len(),
                    partitions = params.partitions,
                    sub_vectors = params.sub_vectors,
                    "training approximate index"
                );
                // Training is CPU-bound; keep it off the async runtime
                Some(
                    tokio::task::spawn_blocking(move || VectorIndex::build(ids, &vectors, params))
                        .await?,
                )
            }
            None => None,
        };

        *self.index.write().await = rebuilt;
        self.index_dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Document-level metadata for every stored document, aggregated from
    /// chunk rows, ordered by filename.
    pub async fn get_documents_metadata(&self) -> Result<Vec<DocumentMetadata>> {
        let pool = self.pool()?;
        let rows = sqlx::query(
            r#"
            SELECT document_id, filename, title, file_type, file_path,
                   language, file_size, file_hash,
                   MIN(created_at) AS created_at,
                   MAX(updated_at) AS updated_at,
                   COUNT(*) AS chunk_count
            FROM chunks
            GROUP BY document_id
            ORDER BY filename
            "#,
        )
        .fetch_all(pool)
        .await?;

        rows.iter().map(decode_metadata_row).collect()
    }

    /// Metadata for one document, or `None` if no chunks exist for the id.
    pub async fn get_document_metadata(
        &self,
        document_id: &str,
    ) -> Result<Option<DocumentMetadata>> {
        let pool = self.pool()?;
        let row = sqlx::query(
            r#"
            SELECT document_id, filename, title, file_type, file_path,
                   language, file_size, file_hash,
                   MIN(created_at) AS created_at,
                   MAX(updated_at) AS updated_at,
                   COUNT(*) AS chunk_count
            FROM chunks
            WHERE document_id = ?1
            GROUP BY document_id
            "#,
        )
        .bind(document_id)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(decode_metadata_row).transpose()
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let pool = self.pool()?;
        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await?;
        let document_count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT document_id) FROM chunks")
                .fetch_one(pool)
                .await?;
        let indexed_rows = self.index.read().await.as_ref().map(|index| index.len());

        Ok(StoreStats {
            chunk_count: chunk_count as usize,
            document_count: document_count as usize,
            embedding_dimension: self.dimension(),
            indexed_rows,
        })
    }

    /// Close the pool. Further operations fail with `NotInitialized`.
    pub async fn close(&self) {
        self.set_state(StoreState::Closed);
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}

enum BindValue {
    Text(String),
    Int(i64),
}

fn placeholders(count: usize) -> String {
    use itertools::Itertools;
    std::iter::repeat_n("?", count).join(", ")
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    // pod_collect_to_vec copies, which also handles blobs SQLite hands us
    // without f16 alignment
    bytemuck::pod_collect_to_vec::<u8, f16>(blob)
        .into_iter()
        .map(|x| x.to_f32())
        .collect()
}

fn timestamp_from_row(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let seconds: i64 = row.try_get(column)?;
    Ok(DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
}

fn decode_row(row: &SqliteRow) -> Result<(DocumentChunk, Vec<f32>)> {
    let chunk = DocumentChunk {
        chunk_id: row.try_get("chunk_id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get::<i64, _>("chunk_index")? as usize,
        content: row.try_get("content")?,
        filename: row.try_get("filename")?,
        title: row.try_get("title")?,
        file_type: row.try_get("file_type")?,
        file_path: row.try_get("file_path")?,
        language: row.try_get("language")?,
        file_size: row.try_get::<i64, _>("file_size")? as u64,
        created_at: timestamp_from_row(row, "created_at")?,
        updated_at: timestamp_from_row(row, "updated_at")?,
        file_hash: row.try_get("file_hash")?,
        page_number: row.try_get::<i64, _>("page_number")? as u32,
        start_index: row.try_get::<i64, _>("start_index")? as usize,
        end_index: row.try_get::<i64, _>("end_index")? as usize,
    };
    let embedding = decode_embedding(row.try_get("embedding")?);
    Ok((chunk, embedding))
}

fn decode_metadata_row(row: &SqliteRow) -> Result<DocumentMetadata> {
    Ok(DocumentMetadata {
        document_id: row.try_get("document_id")?,
        filename: row.try_get("filename")?,
        title: row.try_get("title")?,
        file_type: row.try_get("file_type")?,
        file_path: row.try_get("file_path")?,
        language: row.try_get("language")?,
        file_size: row.try_get::<i64, _>("file_size")? as u64,
        file_hash: row.try_get("file_hash")?,
        created_at: timestamp_from_row(row, "created_at")?,
        updated_at: timestamp_from_row(row, "updated_at")?,
        chunk_count: row.try_get::<i64, _>("chunk_count")? as usize,
    })
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalize a raw distance into a [0, 1] similarity score for the metric.
fn score_for(query: &[f32], stored: &[f32], metric: DistanceMetric) -> f32 {
    match metric {
        // Cosine distance in [0, 2] over normalized vectors
        DistanceMetric::Cosine => {
            let distance = 1.0 - dot(query, stored);
            (1.0 - distance / 2.0).clamp(0.0, 1.0)
        }
        DistanceMetric::Dot => dot(query, stored).clamp(0.0, 1.0),
        DistanceMetric::Euclidean => {
            let distance = query
                .iter()
                .zip(stored.iter())
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum::<f32>()
                .sqrt();
            (-distance).exp()
        }
    }
}
