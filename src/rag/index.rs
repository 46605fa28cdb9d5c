//! In-memory vector index (§4.7), persisted to SQLite by full replace.
//!
//! Deliberately not backed by an external vector database: the design calls
//! for an in-process index with a hashed-bucket fallback embedder, not the
//! teacher's Qdrant-backed `semantic.rs` (see DESIGN.md).

use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::rag::embedder::cosine_similarity;
use crate::rag::types::{IndexEntry, SearchHit, SearchLabel};

pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    id_to_pos: HashMap<u64, usize>,
    dirty: bool,
    pool: SqlitePool,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            entries: Vec::new(),
            id_to_pos: HashMap::new(),
            dirty: false,
            pool,
        }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rag_index (
                id INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load all persisted entries into memory, replacing the in-memory set.
    pub async fn load(&mut self) -> Result<(), sqlx::Error> {
        let rows: Vec<(i64, String, i64, i64, String, Vec<u8>)> =
            sqlx::query_as("SELECT id, source, start_line, end_line, content, embedding FROM rag_index")
                .fetch_all(&self.pool)
                .await?;

        self.entries.clear();
        self.id_to_pos.clear();
        for (id, source, start_line, end_line, content, embedding_bytes) in rows {
            let embedding = decode_embedding(&embedding_bytes);
            self.insert_in_memory(IndexEntry {
                id: id as u64,
                source,
                start_line: start_line as u32,
                end_line: end_line as u32,
                content,
                embedding,
            });
        }
        self.dirty = false;
        Ok(())
    }

    /// Persist the in-memory index to SQLite by full replace.
    pub async fn flush(&mut self) -> Result<(), sqlx::Error> {
        if !self.dirty {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM rag_index").execute(&mut *tx).await?;
        for entry in &self.entries {
            sqlx::query(
                "INSERT INTO rag_index (id, source, start_line, end_line, content, embedding) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.id as i64)
            .bind(&entry.source)
            .bind(entry.start_line as i64)
            .bind(entry.end_line as i64)
            .bind(&entry.content)
            .bind(encode_embedding(&entry.embedding))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.dirty = false;
        Ok(())
    }

    fn insert_in_memory(&mut self, entry: IndexEntry) {
        match self.id_to_pos.get(&entry.id) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.id_to_pos.insert(entry.id, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn upsert(&mut self, entry: IndexEntry) {
        self.insert_in_memory(entry);
        self.dirty = true;
    }

    /// Remove all entries whose `source` matches exactly, e.g. before
    /// reindexing a changed file.
    pub fn remove_by_source(&mut self, source: &str) {
        let removed: Vec<u64> = self
            .entries
            .iter()
            .filter(|e| e.source == source)
            .map(|e| e.id)
            .collect();
        if removed.is_empty() {
            return;
        }
        self.entries.retain(|e| e.source != source);
        self.id_to_pos = self.entries.iter().enumerate().map(|(pos, e)| (e.id, pos)).collect();
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cosine-similarity search over the in-memory matrix, optionally
    /// restricted to sources starting with `source_prefix`.
    pub fn search(&self, query_embedding: &[f32], top_k: usize, source_prefix: Option<&str>) -> Vec<SearchHit> {
        let mut scored: Vec<SearchHit> = self
            .entries
            .iter()
            .filter(|e| source_prefix.is_none_or(|prefix| e.source.starts_with(prefix)))
            .map(|e| SearchHit {
                id: e.id,
                source: e.source.clone(),
                start_line: e.start_line,
                end_line: e.end_line,
                content: e.content.clone(),
                score: cosine_similarity(query_embedding, &e.embedding),
                label: SearchLabel::Vector,
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    /// All entries, for the keyword side of hybrid retrieval.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect()
}
