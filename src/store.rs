//! SQLite-backed vector store.
//!
//! Chunks, their metadata, and their embeddings live in one SQLite database
//! under the configured store directory. Similarity is computed in-process
//! (cosine over little-endian f32 BLOBs), which is plenty for a corpus of
//! course materials and keeps the store dependency-free beyond sqlx.
//!
//! Each collection records the identity of the embedding model that filled
//! it (`provider:model`). Indexing or querying with a different model fails
//! fast instead of silently comparing vectors from incompatible spaces.

use anyhow::{bail, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ContentType, DocMeta};

/// A chunk returned from a similarity query, with its score and (when
/// requested) its stored embedding for MMR re-ranking.
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
    pub embedding: Option<Vec<f32>>,
}

/// Summary line for `forca stats`.
pub struct CollectionInfo {
    pub name: String,
    pub chunks: i64,
    pub sources: i64,
    pub embedding_identity: Option<String>,
}

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Open (or create) the store database under `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;

        let options = SqliteConnectOptions::new()
            .filename(dir.join("forca.db"))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to open store database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                embedding_identity TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                source_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                hash TEXT NOT NULL,
                content_type TEXT NOT NULL,
                knowledge_base_id TEXT NOT NULL,
                page INTEGER,
                course_code TEXT,
                module INTEGER,
                lesson INTEGER,
                lesson_name TEXT,
                summary TEXT,
                difficulty TEXT,
                key_concepts TEXT NOT NULL DEFAULT '[]',
                sanitized INTEGER NOT NULL DEFAULT 0,
                processed_at TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(collection, source_path)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a collection if it does not exist yet.
    pub async fn ensure_collection(&self, name: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)",
        )
        .bind(name)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The `provider:model` identity recorded for a collection, if any.
    pub async fn embedding_identity(&self, collection: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT embedding_identity FROM collections WHERE name = ?")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>(0)))
    }

    /// Record which embedding model fills this collection, or fail fast when
    /// it already carries vectors from a different one.
    pub async fn bind_embedding_identity(&self, collection: &str, identity: &str) -> Result<()> {
        self.ensure_collection(collection).await?;
        match self.embedding_identity(collection).await? {
            None => {
                sqlx::query("UPDATE collections SET embedding_identity = ? WHERE name = ?")
                    .bind(identity)
                    .bind(collection)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
            Some(existing) if existing == identity => Ok(()),
            Some(existing) => bail!(
                "Collection '{}' was indexed with embedding model '{}' but the active model is '{}'. \
                 Re-ingest with --force or switch providers.",
                collection,
                existing,
                identity
            ),
        }
    }

    pub async fn count_chunks(&self, collection: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    /// All known collections with chunk and source counts.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT c.name, c.embedding_identity,
                   COUNT(k.id) AS chunks,
                   COUNT(DISTINCT k.source_path) AS sources
            FROM collections c
            LEFT JOIN chunks k ON k.collection = c.name
            GROUP BY c.name
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| CollectionInfo {
                name: r.get("name"),
                embedding_identity: r.get("embedding_identity"),
                chunks: r.get("chunks"),
                sources: r.get("sources"),
            })
            .collect())
    }

    /// When the configured collection is empty but another non-empty one
    /// exists, adopt the largest existing collection instead of answering
    /// from nothing. Returns the collection name to use.
    pub async fn resolve_collection(&self, configured: &str) -> Result<String> {
        if self.count_chunks(configured).await? > 0 {
            return Ok(configured.to_string());
        }

        let row = sqlx::query(
            r#"
            SELECT collection, COUNT(*) AS n FROM chunks
            GROUP BY collection ORDER BY n DESC LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let name: String = r.get("collection");
                if name != configured {
                    eprintln!(
                        "Warning: collection '{}' is empty; using existing collection '{}'",
                        configured, name
                    );
                }
                Ok(name)
            }
            None => Ok(configured.to_string()),
        }
    }

    pub async fn clear_collection(&self, collection: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(collection)
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE collections SET embedding_identity = NULL WHERE name = ?")
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Distinct source paths currently stored in a collection.
    pub async fn list_sources(&self, collection: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT source_path FROM chunks WHERE collection = ? ORDER BY source_path",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("source_path")).collect())
    }

    pub async fn delete_source(&self, collection: &str, source_path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE collection = ? AND source_path = ?")
            .bind(collection)
            .bind(source_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Content hashes of the chunks already stored for one source, keyed by
    /// chunk id. Used to skip re-embedding unchanged material.
    pub async fn source_hashes(
        &self,
        collection: &str,
        source_path: &str,
    ) -> Result<std::collections::HashMap<String, String>> {
        let rows =
            sqlx::query("SELECT id, hash FROM chunks WHERE collection = ? AND source_path = ?")
                .bind(collection)
                .bind(source_path)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("id"), r.get("hash")))
            .collect())
    }

    /// Insert (or replace) a batch of chunks with their embeddings. The two
    /// slices must be parallel.
    pub async fn add_chunks(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "Chunk/embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let meta = &chunk.meta;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks
                    (id, collection, source_path, chunk_index, content, hash,
                     content_type, knowledge_base_id, page, course_code,
                     module, lesson, lesson_name, summary, difficulty,
                     key_concepts, sanitized, processed_at, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(collection)
            .bind(&meta.source_path)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(meta.content_type.as_str())
            .bind(&meta.knowledge_base_id)
            .bind(meta.page.map(|p| p as i64))
            .bind(&meta.course_code)
            .bind(meta.module.map(|m| m as i64))
            .bind(meta.lesson.map(|l| l as i64))
            .bind(&meta.lesson_name)
            .bind(&meta.summary)
            .bind(&meta.difficulty)
            .bind(serde_json::to_string(&meta.key_concepts)?)
            .bind(meta.sanitized as i64)
            .bind(meta.processed_at.to_rfc3339())
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Top-`limit` chunks by cosine similarity to the query vector. With
    /// `keep_embeddings`, each result carries its stored vector so the
    /// caller can run MMR over the candidate pool.
    pub async fn similarity_search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        keep_embeddings: bool,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let embedding = blob_to_vec(&blob);
            let similarity = cosine_similarity(query, &embedding);
            scored.push(ScoredChunk {
                chunk: chunk_from_row(&row)?,
                similarity,
                embedding: keep_embeddings.then_some(embedding),
            });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
    let content_type_raw: String = row.get("content_type");
    let content_type = ContentType::parse(&content_type_raw);

    let key_concepts_raw: String = row.get("key_concepts");
    let key_concepts: Vec<String> =
        serde_json::from_str(&key_concepts_raw).unwrap_or_default();

    let processed_raw: String = row.get("processed_at");
    let processed_at = chrono::DateTime::parse_from_rfc3339(&processed_raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now());

    Ok(Chunk {
        id: row.get("id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("content"),
        hash: row.get("hash"),
        meta: DocMeta {
            source_path: row.get("source_path"),
            content_type,
            knowledge_base_id: row.get("knowledge_base_id"),
            page: row.get::<Option<i64>, _>("page").map(|p| p as u32),
            course_code: row.get("course_code"),
            module: row.get::<Option<i64>, _>("module").map(|m| m as u32),
            lesson: row.get::<Option<i64>, _>("lesson").map(|l| l as u32),
            lesson_name: row.get("lesson_name"),
            summary: row.get("summary"),
            difficulty: row.get("difficulty"),
            key_concepts,
            sanitized: row.get::<i64, _>("sanitized") != 0,
            processed_at,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, DocMeta};
    use tempfile::TempDir;

    fn test_chunk(id: &str, index: i64, text: &str, source: &str) -> Chunk {
        let meta = DocMeta::new(source, ContentType::Pdf, "kb");
        Chunk {
            id: id.to_string(),
            chunk_index: index,
            text: text.to_string(),
            hash: format!("hash-{}", id),
            meta,
        }
    }

    async fn open_store(dir: &TempDir) -> VectorStore {
        VectorStore::open(dir.path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_and_count() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.ensure_collection("c").await.unwrap();

        let chunks = vec![
            test_chunk("a", 0, "first", "doc.pdf"),
            test_chunk("b", 1, "second", "doc.pdf"),
        ];
        let vecs = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        store.add_chunks("c", &chunks, &vecs).await.unwrap();

        assert_eq!(store.count_chunks("c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_similarity_ordering() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.ensure_collection("c").await.unwrap();

        let chunks = vec![
            test_chunk("far", 0, "far", "doc.pdf"),
            test_chunk("near", 1, "near", "doc.pdf"),
        ];
        let vecs = vec![vec![0.0, 1.0], vec![1.0, 0.1]];
        store.add_chunks("c", &chunks, &vecs).await.unwrap();

        let hits = store
            .similarity_search("c", &[1.0, 0.0], 2, false)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.id, "near");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn test_reinsert_replaces_not_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.ensure_collection("c").await.unwrap();

        let chunks = vec![test_chunk("a", 0, "v1", "doc.pdf")];
        store
            .add_chunks("c", &chunks, &[vec![1.0, 0.0]])
            .await
            .unwrap();
        let chunks = vec![test_chunk("a", 0, "v2", "doc.pdf")];
        store
            .add_chunks("c", &chunks, &[vec![0.0, 1.0]])
            .await
            .unwrap();

        assert_eq!(store.count_chunks("c").await.unwrap(), 1);
        let hits = store
            .similarity_search("c", &[0.0, 1.0], 1, false)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.text, "v2");
    }

    #[tokio::test]
    async fn test_embedding_identity_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .bind_embedding_identity("c", "ollama:nomic-embed-text")
            .await
            .unwrap();
        store
            .bind_embedding_identity("c", "ollama:nomic-embed-text")
            .await
            .unwrap();

        let err = store
            .bind_embedding_identity("c", "openai:text-embedding-3-small")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("indexed with embedding model"));
    }

    #[tokio::test]
    async fn test_clear_resets_identity() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.bind_embedding_identity("c", "a:m").await.unwrap();
        store.clear_collection("c").await.unwrap();
        assert_eq!(store.embedding_identity("c").await.unwrap(), None);
        store.bind_embedding_identity("c", "b:m").await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_collection_adopts_nonempty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.ensure_collection("legacy").await.unwrap();

        let chunks = vec![test_chunk("a", 0, "text", "doc.pdf")];
        store
            .add_chunks("legacy", &chunks, &[vec![1.0]])
            .await
            .unwrap();

        let resolved = store.resolve_collection("forca_knowledge").await.unwrap();
        assert_eq!(resolved, "legacy");
    }

    #[tokio::test]
    async fn test_resolve_collection_prefers_configured_when_populated() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .add_chunks(
                "forca_knowledge",
                &[test_chunk("a", 0, "text", "doc.pdf")],
                &[vec![1.0]],
            )
            .await
            .unwrap();
        store
            .add_chunks("other", &[test_chunk("b", 0, "text", "x.pdf")], &[vec![1.0]])
            .await
            .unwrap();

        let resolved = store.resolve_collection("forca_knowledge").await.unwrap();
        assert_eq!(resolved, "forca_knowledge");
    }

    #[tokio::test]
    async fn test_delete_source_and_hashes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let chunks = vec![
            test_chunk("a", 0, "one", "keep.pdf"),
            test_chunk("b", 0, "two", "drop.pdf"),
        ];
        store
            .add_chunks("c", &chunks, &[vec![1.0], vec![1.0]])
            .await
            .unwrap();

        let hashes = store.source_hashes("c", "keep.pdf").await.unwrap();
        assert_eq!(hashes.get("a").map(String::as_str), Some("hash-a"));

        let removed = store.delete_source("c", "drop.pdf").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count_chunks("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut chunk = test_chunk("a", 3, "conteúdo", "m2/a5.pdf");
        chunk.meta.page = Some(12);
        chunk.meta.module = Some(2);
        chunk.meta.lesson = Some(5);
        chunk.meta.lesson_name = Some("Periodização".to_string());
        chunk.meta.difficulty = Some("avancado".to_string());
        chunk.meta.key_concepts = vec!["sobrecarga".to_string(), "volume".to_string()];
        chunk.meta.sanitized = true;

        store
            .add_chunks("c", &[chunk], &[vec![1.0, 2.0]])
            .await
            .unwrap();

        let hits = store
            .similarity_search("c", &[1.0, 2.0], 1, true)
            .await
            .unwrap();
        let meta = &hits[0].chunk.meta;
        assert_eq!(meta.page, Some(12));
        assert_eq!(meta.module, Some(2));
        assert_eq!(meta.lesson, Some(5));
        assert_eq!(meta.lesson_name.as_deref(), Some("Periodização"));
        assert_eq!(meta.key_concepts.len(), 2);
        assert!(meta.sanitized);
        assert_eq!(hits[0].embedding.as_ref().unwrap().len(), 2);
    }
}
