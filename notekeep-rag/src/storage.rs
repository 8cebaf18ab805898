//! Persistent store of (note, chunk text, embedding) records.
//!
//! Records live in `embedding_records`; their vectors are mirrored into the
//! sqlite-vec `record_vec` table (keyed by the record's `seq`) for kNN
//! queries across all notes. Queries scoped to one note scan that note's rows
//! with `vec_distance_l2`, which is exact. Both paths use L2 distance.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use chrono::Utc;
use libsqlite3_sys::{SQLITE_OK, sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use notekeep_core::RagSettings;

use crate::embeddings::Embedding;
use crate::errors::{RagError, RagResult};
use crate::paths::embeddings_db_path;

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

/// vec0 rejects larger `k` values.
const MAX_KNN: usize = 4096;
const DELETE_BATCH: usize = 500;

/// One nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarChunk {
    pub note_id: String,
    pub chunk_text: String,
    pub distance: f32,
}

/// Handle to the embedding store with an explicit open/close lifecycle.
///
/// Cloning shares the underlying pool. Every operation fails with
/// [`RagError::StoreUnavailable`] while the store is closed.
#[derive(Debug, Clone)]
pub struct VectorStore {
    db_path: PathBuf,
    dimension: usize,
    pool: Arc<RwLock<Option<SqlitePool>>>,
    /// Serializes open and close across clones.
    lifecycle: Arc<Mutex<()>>,
}

impl VectorStore {
    pub fn new(db_path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            db_path: db_path.into(),
            dimension,
            pool: Arc::new(RwLock::new(None)),
            lifecycle: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_settings(settings: &RagSettings) -> RagResult<Self> {
        Ok(Self::new(
            embeddings_db_path(settings)?,
            settings.embedding_dim,
        ))
    }

    /// Create and open a store in one step.
    pub async fn open_at(db_path: &Path, dimension: usize) -> RagResult<Self> {
        let store = Self::new(db_path, dimension);
        store.open().await?;
        Ok(store)
    }

    pub async fn open(&self) -> RagResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_open() {
            return Ok(());
        }

        init_sqlite_vec_once()?;
        if let Some(parent) = self.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous = NORMAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA cache_size = -64000")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        if let Err(err) = ensure_vec_table(&pool, self.dimension).await {
            pool.close().await;
            return Err(err);
        }

        let mut slot = self.pool.write().map_err(|_| RagError::StoreUnavailable)?;
        *slot = Some(pool);
        info!(path = %self.db_path.display(), dimension = self.dimension, "vector store opened");
        Ok(())
    }

    pub async fn close(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let pool = match self.pool.write() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(pool) = pool {
            pool.close().await;
            info!(path = %self.db_path.display(), "vector store closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.pool
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn pool(&self) -> RagResult<SqlitePool> {
        self.pool
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(RagError::StoreUnavailable)
    }

    /// Insert a new record and return its id. Never updates in place.
    pub async fn upsert_chunk(
        &self,
        note_id: &str,
        chunk_text: &str,
        embedding: &Embedding,
    ) -> RagResult<String> {
        self.upsert_chunk_at(note_id, chunk_text, embedding, 0, 0)
            .await
    }

    /// Insert a new record tagged with its chunk position and indexing generation.
    pub async fn upsert_chunk_at(
        &self,
        note_id: &str,
        chunk_text: &str,
        embedding: &Embedding,
        sequence_index: usize,
        generation: u64,
    ) -> RagResult<String> {
        self.check_dimension(embedding)?;
        let pool = self.pool()?;
        let payload = embedding.to_json()?;
        let id = Uuid::new_v4().to_string();

        let mut tx = pool.begin().await?;
        let result = sqlx::query(
            r#"INSERT INTO embedding_records (id, note_id, chunk_text, sequence_index, generation, embedding, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(note_id)
        .bind(chunk_text)
        .bind(sequence_index as i64)
        .bind(generation as i64)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO record_vec(rowid, embedding) VALUES (?, ?)")
            .bind(result.last_insert_rowid())
            .bind(&payload)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(id)
    }

    /// Delete every record of a note. Returns how many were removed.
    pub async fn delete_all_for_note(&self, note_id: &str) -> RagResult<u64> {
        let pool = self.pool()?;
        let mut tx = pool.begin().await?;

        let removed: Vec<(i64,)> =
            sqlx::query_as("DELETE FROM embedding_records WHERE note_id = ? RETURNING seq")
                .bind(note_id)
                .fetch_all(&mut *tx)
                .await?;

        for batch in removed.chunks(DELETE_BATCH) {
            let placeholders = batch.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let sql = format!("DELETE FROM record_vec WHERE rowid IN ({})", placeholders);
            let mut q = sqlx::query(&sql);
            for (seq,) in batch {
                q = q.bind(*seq);
            }
            q.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(note_id, removed = removed.len(), "deleted note records");
        Ok(removed.len() as u64)
    }

    /// The `k` records nearest to `query`, nearest first.
    ///
    /// With `note_id` only that note's records participate.
    pub async fn find_similar(
        &self,
        query: &Embedding,
        note_id: Option<&str>,
        k: usize,
    ) -> RagResult<Vec<SimilarChunk>> {
        self.check_dimension(query)?;
        let pool = self.pool()?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let payload = query.to_json()?;

        let rows: Vec<(String, String, f32)> = match note_id {
            Some(note_id) => {
                sqlx::query_as(
                    r#"SELECT note_id, chunk_text, vec_distance_l2(embedding, ?) AS distance
                       FROM embedding_records
                       WHERE note_id = ?
                       ORDER BY distance ASC, seq ASC
                       LIMIT ?"#,
                )
                .bind(&payload)
                .bind(note_id)
                .bind(k as i64)
                .fetch_all(&pool)
                .await?
            }
            None => {
                let knn_k = k.min(MAX_KNN);
                // KNN must run in a CTE with `k = ?` because vec0 cannot see LIMIT through JOINs.
                sqlx::query_as(
                    "WITH knn AS (SELECT rowid, distance FROM record_vec WHERE embedding MATCH ? AND k = ?) \
                     SELECT r.note_id, r.chunk_text, knn.distance FROM knn \
                     JOIN embedding_records r ON r.seq = knn.rowid \
                     ORDER BY knn.distance ASC, r.seq ASC LIMIT ?",
                )
                .bind(&payload)
                .bind(knn_k as i64)
                .bind(knn_k as i64)
                .fetch_all(&pool)
                .await?
            }
        };

        debug!(?note_id, k, hits = rows.len(), "similarity search");
        Ok(rows
            .into_iter()
            .map(|(note_id, chunk_text, distance)| SimilarChunk {
                note_id,
                chunk_text,
                distance,
            })
            .collect())
    }

    pub async fn has_any_records(&self, note_id: &str) -> RagResult<bool> {
        let pool = self.pool()?;
        let (exists,): (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM embedding_records WHERE note_id = ? LIMIT 1)",
        )
        .bind(note_id)
        .fetch_one(&pool)
        .await?;
        Ok(exists != 0)
    }

    pub async fn count_for_note(&self, note_id: &str) -> RagResult<u64> {
        let pool = self.pool()?;
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM embedding_records WHERE note_id = ?")
                .bind(note_id)
                .fetch_one(&pool)
                .await?;
        Ok(count as u64)
    }

    /// Chunk texts of a note in sequence order, with the generation that wrote them.
    pub async fn chunks_for_note(&self, note_id: &str) -> RagResult<Vec<(String, u64)>> {
        let pool = self.pool()?;
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT chunk_text, generation FROM embedding_records WHERE note_id = ? ORDER BY sequence_index ASC, seq ASC",
        )
        .bind(note_id)
        .fetch_all(&pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(text, generation)| (text, generation as u64))
            .collect())
    }

    fn check_dimension(&self, embedding: &Embedding) -> RagResult<()> {
        if embedding.dimension() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }
        Ok(())
    }
}

fn init_sqlite_vec_once() -> RagResult<()> {
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        type SqliteVecInitFn =
            unsafe extern "C" fn(*mut sqlite3, *mut *const i8, *const sqlite3_api_routines) -> i32;

        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteVecInitFn>(
            sqlite3_vec_init as *const (),
        )))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(RagError::SqliteVec(format!(
            "sqlite-vec init failed with code {rc}"
        )))
    }
}

async fn run_migrations(pool: &SqlitePool) -> RagResult<()> {
    sqlx::migrate!("./migrations/rag").run(pool).await?;
    Ok(())
}

/// Create the vec0 table on first open and pin its dimension in `meta`.
async fn ensure_vec_table(pool: &SqlitePool, dimension: usize) -> RagResult<()> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT value FROM meta WHERE key = 'embedding_dim' LIMIT 1")
            .fetch_optional(pool)
            .await?;

    if let Some((value,)) = existing
        && let Ok(pinned) = value.parse::<usize>()
        && pinned != dimension
    {
        return Err(RagError::DimensionMismatch {
            expected: pinned,
            actual: dimension,
        });
    }

    let create_sql = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS record_vec USING vec0(embedding float[{}])",
        dimension
    );
    sqlx::query(&create_sql).execute(pool).await?;

    sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_dim', ?)")
        .bind(dimension.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dimension: usize) -> (VectorStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = VectorStore::open_at(&temp.path().join("rag.sqlite3"), dimension)
            .await
            .unwrap();
        (store, temp)
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[tokio::test]
    async fn unopened_store_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let store = VectorStore::new(temp.path().join("rag.sqlite3"), 3);

        assert!(matches!(
            store.find_similar(&emb(&[1.0, 0.0, 0.0]), None, 3).await,
            Err(RagError::StoreUnavailable)
        ));
        assert!(matches!(
            store.has_any_records("n1").await,
            Err(RagError::StoreUnavailable)
        ));
        assert!(matches!(
            store.upsert_chunk("n1", "text", &emb(&[1.0, 0.0, 0.0])).await,
            Err(RagError::StoreUnavailable)
        ));
    }

    #[tokio::test]
    async fn closed_store_becomes_unavailable() {
        let (store, _temp) = open_store(3).await;
        store.upsert_chunk("n1", "a", &emb(&[1.0, 0.0, 0.0])).await.unwrap();
        store.close().await;
        assert!(!store.is_open());
        assert!(matches!(
            store.delete_all_for_note("n1").await,
            Err(RagError::StoreUnavailable)
        ));

        store.open().await.unwrap();
        assert_eq!(store.count_for_note("n1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_opens_share_one_pool() {
        let temp = TempDir::new().unwrap();
        let store = VectorStore::new(temp.path().join("rag.sqlite3"), 3);
        let other = store.clone();

        let (first, second) = tokio::join!(store.open(), other.open());
        first.unwrap();
        second.unwrap();

        let pool = store.pool().unwrap();
        other.upsert_chunk("n1", "a", &emb(&[1.0, 0.0, 0.0])).await.unwrap();
        assert_eq!(store.count_for_note("n1").await.unwrap(), 1);

        other.close().await;
        assert!(!store.is_open());
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn upsert_always_inserts_with_fresh_ids() {
        let (store, _temp) = open_store(3).await;
        let a = store.upsert_chunk("n1", "same", &emb(&[1.0, 0.0, 0.0])).await.unwrap();
        let b = store.upsert_chunk("n1", "same", &emb(&[1.0, 0.0, 0.0])).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count_for_note("n1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_scoped() {
        let (store, _temp) = open_store(3).await;
        store.upsert_chunk("n1", "a", &emb(&[1.0, 0.0, 0.0])).await.unwrap();
        store.upsert_chunk("n1", "b", &emb(&[0.0, 1.0, 0.0])).await.unwrap();
        store.upsert_chunk("n2", "c", &emb(&[0.0, 0.0, 1.0])).await.unwrap();

        assert_eq!(store.delete_all_for_note("n1").await.unwrap(), 2);
        assert_eq!(store.delete_all_for_note("n1").await.unwrap(), 0);
        assert_eq!(store.delete_all_for_note("missing").await.unwrap(), 0);

        assert!(!store.has_any_records("n1").await.unwrap());
        assert!(store.has_any_records("n2").await.unwrap());
        assert!(
            store
                .find_similar(&emb(&[1.0, 0.0, 0.0]), Some("n1"), 5)
                .await
                .unwrap()
                .is_empty()
        );

        // The vector index no longer returns deleted rows either.
        let global = store
            .find_similar(&emb(&[1.0, 0.0, 0.0]), None, 5)
            .await
            .unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].chunk_text, "c");
    }

    #[tokio::test]
    async fn scoped_search_orders_by_distance() {
        let (store, _temp) = open_store(3).await;
        store.upsert_chunk("n1", "far", &emb(&[0.0, 0.0, 1.0])).await.unwrap();
        store.upsert_chunk("n1", "near", &emb(&[0.9, 0.1, 0.0])).await.unwrap();
        store.upsert_chunk("n1", "exact", &emb(&[1.0, 0.0, 0.0])).await.unwrap();
        store.upsert_chunk("n2", "other note", &emb(&[1.0, 0.0, 0.0])).await.unwrap();

        let hits = store
            .find_similar(&emb(&[1.0, 0.0, 0.0]), Some("n1"), 10)
            .await
            .unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk_text.as_str()).collect();
        assert_eq!(texts, vec!["exact", "near", "far"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(hits[0].distance.abs() < 1e-6);
        assert!(hits.iter().all(|h| h.note_id == "n1"));
    }

    #[tokio::test]
    async fn unscoped_search_spans_notes_and_respects_k() {
        let (store, _temp) = open_store(3).await;
        store.upsert_chunk("n1", "a", &emb(&[1.0, 0.0, 0.0])).await.unwrap();
        store.upsert_chunk("n2", "b", &emb(&[0.8, 0.2, 0.0])).await.unwrap();
        store.upsert_chunk("n3", "c", &emb(&[0.0, 1.0, 0.0])).await.unwrap();

        let hits = store
            .find_similar(&emb(&[1.0, 0.0, 0.0]), None, 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].note_id, "n1");
        assert_eq!(hits[1].note_id, "n2");
        assert!(hits[0].distance <= hits[1].distance);

        assert!(
            store
                .find_similar(&emb(&[1.0, 0.0, 0.0]), None, 0)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn empty_store_returns_no_hits() {
        let (store, _temp) = open_store(3).await;
        assert!(
            store
                .find_similar(&emb(&[1.0, 0.0, 0.0]), None, 5)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            store
                .find_similar(&emb(&[1.0, 0.0, 0.0]), Some("n1"), 5)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_rejected() {
        let (store, temp) = open_store(3).await;
        assert!(matches!(
            store.upsert_chunk("n1", "a", &emb(&[1.0, 0.0])).await,
            Err(RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(matches!(
            store.find_similar(&emb(&[1.0; 4]), None, 1).await,
            Err(RagError::DimensionMismatch { .. })
        ));

        store.close().await;
        let reopened = VectorStore::new(temp.path().join("rag.sqlite3"), 8);
        assert!(matches!(
            reopened.open().await,
            Err(RagError::DimensionMismatch {
                expected: 3,
                actual: 8
            })
        ));
        assert!(!reopened.is_open());
    }

    #[tokio::test]
    async fn round_trip_returns_stored_text_at_zero_distance() {
        let (store, _temp) = open_store(4).await;
        let e = emb(&[0.123_456_79, -0.5, 2.25, 1e-3]);
        store.upsert_chunk("n", "text", &e).await.unwrap();

        let hits = store.find_similar(&e, Some("n"), 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_text, "text");
        assert!(hits[0].distance.abs() < 1e-6);
    }
}
