//! Memory store (§4.8): a typed SQLite-backed store for facts, decisions,
//! preferences, and context notes, not vectorised in v1.
//!
//! Grounded on `mira-chat/src/tools/memory.rs`'s remember/recall pair, but
//! generalized from a single `fact_type` string to the four typed kinds and
//! single-table keyword search the design calls for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("content must not be empty")]
    EmptyContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Decision,
    Preference,
    Context,
}

impl MemoryType {
    fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Decision => "decision",
            MemoryType::Preference => "preference",
            MemoryType::Context => "context",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "fact" => Some(MemoryType::Fact),
            "decision" => Some(MemoryType::Decision),
            "preference" => Some(MemoryType::Preference),
            "context" => Some(MemoryType::Context),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub project_id: Option<String>,
    pub importance: f32,
    pub tags: Vec<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMemoryItem {
    pub content: String,
    pub memory_type: MemoryType,
    pub project_id: Option<String>,
    pub importance: f32,
    pub tags: Vec<String>,
    pub source: String,
}

const MAX_SEARCH_KEYWORDS: usize = 5;

pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_items (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                memory_type TEXT NOT NULL,
                project_id TEXT,
                importance REAL NOT NULL DEFAULT 0.5,
                tags TEXT NOT NULL DEFAULT '[]',
                source TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add(&self, item: NewMemoryItem) -> Result<MemoryItem, MemoryError> {
        if item.content.trim().is_empty() {
            return Err(MemoryError::EmptyContent);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let tags_json = serde_json::to_string(&item.tags).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO memory_items (id, content, memory_type, project_id, importance, tags, source, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&item.content)
        .bind(item.memory_type.as_str())
        .bind(&item.project_id)
        .bind(item.importance)
        .bind(&tags_json)
        .bind(&item.source)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(MemoryItem {
            id,
            content: item.content,
            memory_type: item.memory_type,
            project_id: item.project_id,
            importance: item.importance,
            tags: item.tags,
            source: item.source,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryItem>, MemoryError> {
        let row: Option<MemoryRow> = sqlx::query_as(
            "SELECT id, content, memory_type, project_id, importance, tags, source, created_at, updated_at FROM memory_items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Lowercased `LIKE` search over up to the first five whitespace-
    /// separated keywords of `query`, ordered by `importance DESC,
    /// updated_at DESC`.
    pub async fn search(
        &self,
        query: &str,
        project_id: Option<&str>,
        memory_type: Option<MemoryType>,
        top_k: usize,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let keywords: Vec<String> = query
            .split_whitespace()
            .take(MAX_SEARCH_KEYWORDS)
            .map(|w| w.to_lowercase())
            .collect();

        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT id, content, memory_type, project_id, importance, tags, source, created_at, updated_at FROM memory_items WHERE (",
        );
        sql.push_str(&keywords.iter().map(|_| "LOWER(content) LIKE ?").collect::<Vec<_>>().join(" OR "));
        sql.push(')');
        if project_id.is_some() {
            sql.push_str(" AND project_id = ?");
        }
        if memory_type.is_some() {
            sql.push_str(" AND memory_type = ?");
        }
        sql.push_str(" ORDER BY importance DESC, updated_at DESC LIMIT ?");

        let mut q = sqlx::query_as::<_, MemoryRow>(&sql);
        for kw in &keywords {
            q = q.bind(format!("%{kw}%"));
        }
        if let Some(pid) = project_id {
            q = q.bind(pid);
        }
        if let Some(mt) = memory_type {
            q = q.bind(mt.as_str());
        }
        q = q.bind(top_k as i64);

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_recent(&self, project_id: Option<&str>, limit: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        let rows: Vec<MemoryRow> = if let Some(pid) = project_id {
            sqlx::query_as(
                "SELECT id, content, memory_type, project_id, importance, tags, source, created_at, updated_at FROM memory_items WHERE project_id = ? ORDER BY updated_at DESC LIMIT ?",
            )
            .bind(pid)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT id, content, memory_type, project_id, importance, tags, source, created_at, updated_at FROM memory_items ORDER BY updated_at DESC LIMIT ?",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn remove(&self, id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM memory_items WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_importance(&self, id: &str, importance: f32) -> Result<bool, MemoryError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE memory_items SET importance = ?, updated_at = ? WHERE id = ?")
            .bind(importance)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct MemoryRow {
    id: String,
    content: String,
    memory_type: String,
    project_id: Option<String>,
    importance: f32,
    tags: String,
    source: String,
    created_at: String,
    updated_at: String,
}

impl From<MemoryRow> for MemoryItem {
    fn from(row: MemoryRow) -> Self {
        MemoryItem {
            id: row.id,
            content: row.content,
            memory_type: MemoryType::parse(&row.memory_type).unwrap_or(MemoryType::Context),
            project_id: row.project_id,
            importance: row.importance,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            source: row.source,
            created_at: DateTime::parse_from_rfc3339(&row.created_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
            updated_at: DateTime::parse_from_rfc3339(&row.updated_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_store() -> MemoryStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = MemoryStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn item(content: &str, memory_type: MemoryType, importance: f32) -> NewMemoryItem {
        NewMemoryItem {
            content: content.to_string(),
            memory_type,
            project_id: None,
            importance,
            tags: vec![],
            source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn add_and_get_round_trips() {
        let store = new_store().await;
        let added = store.add(item("user prefers dark mode", MemoryType::Preference, 0.8)).await.unwrap();
        let fetched = store.get(&added.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "user prefers dark mode");
        assert_eq!(fetched.memory_type, MemoryType::Preference);
    }

    #[tokio::test]
    async fn add_rejects_empty_content() {
        let store = new_store().await;
        let result = store.add(item("   ", MemoryType::Fact, 0.5)).await;
        assert!(matches!(result, Err(MemoryError::EmptyContent)));
    }

    #[tokio::test]
    async fn search_matches_keywords_ordered_by_importance() {
        let store = new_store().await;
        store.add(item("the build uses cargo workspaces", MemoryType::Fact, 0.3)).await.unwrap();
        store.add(item("the deploy uses cargo release profile", MemoryType::Fact, 0.9)).await.unwrap();

        let hits = store.search("cargo", None, None, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "the deploy uses cargo release profile");
    }

    #[tokio::test]
    async fn search_respects_memory_type_filter() {
        let store = new_store().await;
        store.add(item("decided to use sqlite", MemoryType::Decision, 0.7)).await.unwrap();
        store.add(item("sqlite is fast for this scale", MemoryType::Fact, 0.7)).await.unwrap();

        let hits = store.search("sqlite", None, Some(MemoryType::Decision), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory_type, MemoryType::Decision);
    }

    #[tokio::test]
    async fn remove_deletes_item() {
        let store = new_store().await;
        let added = store.add(item("temp note", MemoryType::Context, 0.1)).await.unwrap();
        assert!(store.remove(&added.id).await.unwrap());
        assert!(store.get(&added.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_importance_changes_ordering() {
        let store = new_store().await;
        let a = store.add(item("low then high priority note about rust", MemoryType::Fact, 0.1)).await.unwrap();
        store.add(item("another note about rust", MemoryType::Fact, 0.5)).await.unwrap();

        store.update_importance(&a.id, 0.95).await.unwrap();
        let hits = store.search("rust", None, None, 10).await.unwrap();
        assert_eq!(hits[0].id, a.id);
    }

    #[tokio::test]
    async fn list_recent_orders_by_updated_at() {
        let store = new_store().await;
        store.add(item("first", MemoryType::Context, 0.5)).await.unwrap();
        let second = store.add(item("second", MemoryType::Context, 0.5)).await.unwrap();

        let recent = store.list_recent(None, 10).await.unwrap();
        assert_eq!(recent[0].id, second.id);
    }
}
