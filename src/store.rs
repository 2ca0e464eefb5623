//! Persistent vector index backed by SQLite.
//!
//! A store is a directory containing `index.sqlite`. Chunks are append-only
//! rows keyed by their content hash, with the embedding kept as a
//! little-endian `f32` BLOB. Queries load every vector and rank by cosine
//! similarity in Rust, so the store needs no SQLite extensions.
//!
//! The `store_meta` table records which embedding model wrote the vectors.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, warn};

use crate::embedding::{self, Embedder};
use crate::error::{EmbedError, StoreError};
use crate::models::{ChunkMetadata, DocumentChunk};

pub const INDEX_FILE: &str = "index.sqlite";

/// SQLite caps bound parameters per statement; stay well below it.
const HASH_LOOKUP_GROUP: usize = 500;

pub struct VectorStore {
    pool: SqlitePool,
    dir: PathBuf,
}

impl VectorStore {
    /// Open (creating if needed) the store in `dir` and verify it accepts
    /// writes. Any failure, including a corrupt or read-only index, is a
    /// [`StoreError::Open`].
    pub async fn open(dir: &Path, embedder: &dyn Embedder) -> Result<Self, StoreError> {
        let open_err = |reason: String| StoreError::Open {
            path: dir.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(dir).map_err(|e| open_err(e.to_string()))?;
        let db_path = dir.join(INDEX_FILE);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| open_err(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| open_err(e.to_string()))?;

        let store = Self {
            pool,
            dir: dir.to_path_buf(),
        };
        if let Err(e) = store.prepare(embedder).await {
            store.pool.close().await;
            return Err(open_err(e.to_string()));
        }
        debug!(dir = %dir.display(), "vector store opened");
        Ok(store)
    }

    async fn prepare(&self, embedder: &dyn Embedder) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                hash TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO store_meta (key, value) VALUES ('model', ?), ('dims', ?) \
             ON CONFLICT(key) DO NOTHING",
        )
        .bind(embedder.model_name())
        .bind(embedder.dims().to_string())
        .execute(&self.pool)
        .await?;

        // Always writes, so a read-only index fails here rather than on insert.
        sqlx::query(
            "INSERT INTO store_meta (key, value) VALUES ('opened_at', ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let recorded: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'model'")
                .fetch_optional(&self.pool)
                .await?;
        if let Some(recorded) = recorded {
            if recorded != embedder.model_name() {
                warn!(
                    dir = %self.dir.display(),
                    store_model = %recorded,
                    embedder_model = %embedder.model_name(),
                    "store was written by a different embedding model"
                );
            }
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// The subset of `hashes` already present in the store.
    pub async fn existing_hashes(&self, hashes: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut found = HashSet::new();
        for group in hashes.chunks(HASH_LOOKUP_GROUP) {
            let sql = format!(
                "SELECT hash FROM chunks WHERE hash IN ({})",
                vec!["?"; group.len()].join(", ")
            );
            let mut query = sqlx::query(&sql);
            for hash in group {
                query = query.bind(hash);
            }
            for row in query.fetch_all(&self.pool).await? {
                found.insert(row.get::<String, _>("hash"));
            }
        }
        Ok(found)
    }

    /// Insert chunks with their vectors in one transaction. Rows whose hash
    /// is already stored are left untouched. Returns the number of new rows.
    pub async fn add(
        &self,
        chunks: &[DocumentChunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        if chunks.len() != vectors.len() {
            return Err(StoreError::Embed(EmbedError::Provider(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            ))));
        }

        let now = chrono::Utc::now().timestamp();
        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let result = sqlx::query(
                r#"
                INSERT INTO chunks (hash, source, content, metadata_json, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(hash) DO NOTHING
                "#,
            )
            .bind(chunk.content_hash())
            .bind(&chunk.metadata.source)
            .bind(&chunk.content)
            .bind(chunk.metadata_json())
            .bind(embedding::vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Top `k` chunks by cosine similarity to `query_vec`, best first.
    pub async fn similarity_search(
        &self,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<(DocumentChunk, f32)>, StoreError> {
        let rows = sqlx::query("SELECT source, content, metadata_json, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<(DocumentChunk, f32)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = embedding::cosine_similarity(query_vec, &embedding::blob_to_vec(&blob));
                let source: String = row.get("source");
                let metadata_json: String = row.get("metadata_json");
                let metadata = serde_json::from_str(&metadata_json)
                    .unwrap_or_else(|_| ChunkMetadata::new(source));
                (DocumentChunk::new(row.get::<String, _>("content"), metadata), score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
