//! SQLite-backed vector store with brute-force cosine ranking.
//!
//! Each collection lives in one table row set keyed by collection name.
//! Embeddings are stored as little-endian `f32` blobs; metadata as JSON.

use crate::config::RetrievalConfig;
use crate::document::{Document, Metadata};
use crate::embeddings::{Embedder, cosine_similarity};
use crate::error::{RagError, StoreError};
use crate::retrieval::Retriever;
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT NOT NULL UNIQUE,
    collection TEXT NOT NULL,
    content    TEXT NOT NULL,
    metadata   TEXT NOT NULL,
    embedding  BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection);
";

/// A named collection of embedded documents.
pub struct VectorStore {
    conn: Mutex<Connection>,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("collection", &self.collection)
            .field("embedder", &self.embedder.model_name())
            .finish()
    }
}

impl VectorStore {
    /// Open a transient in-memory store.
    pub fn in_memory(
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, collection, embedder)
    }

    /// Open (or create) a file-backed store.
    pub fn open(
        path: &Path,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::with_connection(Connection::open(path)?, collection, embedder)
    }

    /// Open according to retrieval settings: file-backed when a persist path is set.
    pub fn from_config(
        config: &RetrievalConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        match &config.persist_path {
            Some(path) => Self::open(path, config.collection.clone(), embedder),
            None => Self::in_memory(config.collection.clone(), embedder),
        }
    }

    fn with_connection(
        conn: Connection,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let collection = collection.into();
        debug!(collection = %collection, embedder = embedder.model_name(), "Opened vector store");
        Ok(Self {
            conn: Mutex::new(conn),
            collection,
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clear the collection, then index `documents` into it.
    ///
    /// Reindexing a persisted collection this way leaves one copy of each chunk.
    pub async fn replace_documents(
        &self,
        documents: &[Document],
    ) -> Result<Vec<String>, RagError> {
        self.clear()?;
        self.add_documents(documents).await
    }

    /// Embed and insert documents, returning their generated ids in order.
    pub async fn add_documents(&self, documents: &[Document]) -> Result<Vec<String>, RagError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(StoreError::AddFailed {
                message: format!(
                    "embedder returned {} vectors for {} documents",
                    vectors.len(),
                    documents.len()
                ),
            }
            .into());
        }

        let mut ids = Vec::with_capacity(documents.len());
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;
        for (doc, vector) in documents.iter().zip(vectors.iter()) {
            let id = uuid::Uuid::new_v4().to_string();
            let metadata = serde_json::to_string(&doc.metadata)?;
            tx.execute(
                "INSERT INTO chunks (id, collection, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, self.collection, doc.page_content, metadata, encode_vector(vector)],
            )
            .map_err(StoreError::from)?;
            ids.push(id);
        }
        tx.commit().map_err(StoreError::from)?;

        info!(collection = %self.collection, added = ids.len(), "Added documents to vector store");
        Ok(ids)
    }

    /// Top-`k` documents with their cosine similarity, most similar first.
    ///
    /// `filter` keeps only documents whose metadata contains every given
    /// key with an equal value. Ties keep insertion order.
    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<(Document, f32)>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_query(query).await?;

        let rows = {
            let conn = self.lock();
            let mut stmt = conn
                .prepare(
                    "SELECT content, metadata, embedding FROM chunks
                     WHERE collection = ?1 ORDER BY seq",
                )
                .map_err(StoreError::from)?;
            let mapped = stmt
                .query_map(params![self.collection], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })
                .map_err(StoreError::from)?;
            mapped
                .collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::from)?
        };

        let mut scored = Vec::new();
        for (content, metadata, blob) in rows {
            let metadata: Metadata = serde_json::from_str(&metadata)?;
            if let Some(filter) = filter
                && !matches_filter(&metadata, filter)
            {
                continue;
            }
            let vector = decode_vector(&blob);
            if vector.len() != query_vector.len() {
                return Err(StoreError::DimensionMismatch {
                    stored: vector.len(),
                    query: query_vector.len(),
                }
                .into());
            }
            let score = cosine_similarity(&query_vector, &vector);
            scored.push((
                Document {
                    page_content: content,
                    metadata,
                },
                score,
            ));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        debug!(collection = %self.collection, k, returned = scored.len(), "Similarity search");
        Ok(scored)
    }

    /// Top-`k` documents, most similar first.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<Document>, RagError> {
        Ok(self
            .similarity_search_with_score(query, k, filter)
            .await?
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }

    /// Delete documents by id. Unknown ids are ignored.
    pub fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        let conn = self.lock();
        let mut removed = 0;
        for id in ids {
            removed += conn.execute(
                "DELETE FROM chunks WHERE collection = ?1 AND id = ?2",
                params![self.collection, id],
            )?;
        }
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Remove every document in this collection.
    pub fn clear(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM chunks WHERE collection = ?1",
            params![self.collection],
        )?;
        info!(collection = %self.collection, removed, "Cleared vector store");
        Ok(())
    }
}

#[async_trait]
impl Retriever for VectorStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>, RagError> {
        self.similarity_search(query, k, None).await
    }
}

fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
