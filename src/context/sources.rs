//! Concrete [`ContextSource`] implementations (§4.5): the eight named
//! sources the context pipeline assembles into one system prompt, each
//! registered at its fixed priority from [`crate::context::section::priority`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::context::builder::ContextSource;
use crate::context::section::{priority, Section};
use crate::memory::MemoryStore;
use crate::rag::embedder::Embedder;
use crate::rag::index::VectorIndex;
use crate::rag::retriever::HybridRetriever;

/// A section whose content is fixed ahead of time — anti-fabrication
/// preamble, role persona, project basics, tool strategy.
pub struct StaticSource {
    name: &'static str,
    content: String,
    priority: u32,
}

impl StaticSource {
    pub fn new(name: &'static str, content: impl Into<String>, priority: u32) -> Self {
        Self { name, content: content.into(), priority }
    }
}

#[async_trait]
impl ContextSource for StaticSource {
    fn priority(&self) -> u32 {
        self.priority
    }

    async fn gather(&self, _remaining_budget: u32) -> Vec<Section> {
        if self.content.trim().is_empty() {
            return Vec::new();
        }
        vec![Section::new(self.name, self.content.clone(), self.priority, false)]
    }
}

/// Workspace VCS overview, wraps [`crate::vcs::overview`].
pub struct WorkspaceOverviewSource {
    root: PathBuf,
}

impl WorkspaceOverviewSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ContextSource for WorkspaceOverviewSource {
    fn priority(&self) -> u32 {
        priority::WORKSPACE_OVERVIEW
    }

    async fn gather(&self, _remaining_budget: u32) -> Vec<Section> {
        let Ok(overview) = crate::vcs::overview(&self.root).await else {
            return Vec::new();
        };

        let mut text = format!("Workspace: {}\nVCS: {:?}", self.root.display(), overview.vcs);
        if let Some(branch) = &overview.branch {
            text.push_str(&format!("\nBranch: {branch}"));
        }
        if let Some(commit) = &overview.head_commit {
            text.push_str(&format!("\nHEAD: {commit}"));
        }
        text.push_str(&format!("\nDirty: {}", overview.is_dirty));
        if let Some(url) = &overview.remote_url {
            text.push_str(&format!("\nRemote: {url}"));
        }
        text.push_str(&format!("\nTracked files: {}", overview.tracked_file_count));

        vec![Section::new("workspace_overview", text, priority::WORKSPACE_OVERVIEW, true)]
    }
}

/// Hybrid retrieval over the workspace's code index for the current turn's
/// query, wraps [`crate::rag::retriever::HybridRetriever`].
pub struct RagContextSource {
    index: Arc<Mutex<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    query: String,
    top_k: usize,
}

impl RagContextSource {
    pub fn new(index: Arc<Mutex<VectorIndex>>, embedder: Arc<dyn Embedder>, query: impl Into<String>, top_k: usize) -> Self {
        Self { index, embedder, query: query.into(), top_k }
    }
}

#[async_trait]
impl ContextSource for RagContextSource {
    fn priority(&self) -> u32 {
        priority::RAG
    }

    async fn gather(&self, _remaining_budget: u32) -> Vec<Section> {
        if self.query.trim().is_empty() {
            return Vec::new();
        }

        let index = self.index.lock().await;
        if index.is_empty() {
            return Vec::new();
        }

        let retriever = HybridRetriever::new(&index, self.embedder.as_ref());
        let hits = retriever.retrieve(&self.query, self.top_k, None).await;
        if hits.is_empty() {
            return Vec::new();
        }

        let mut text = String::from("# Relevant code\n\n");
        for hit in &hits {
            text.push_str(&format!("## {} (lines {}-{})\n```\n{}\n```\n\n", hit.source, hit.start_line, hit.end_line, hit.content));
        }

        vec![Section::new("rag", text.trim_end(), priority::RAG, true)]
    }
}

/// Long-term memory recall for the current turn's query, wraps
/// [`crate::memory::MemoryStore::search`].
pub struct MemoryContextSource {
    store: Arc<MemoryStore>,
    query: String,
    project_id: Option<String>,
    top_k: usize,
}

impl MemoryContextSource {
    pub fn new(store: Arc<MemoryStore>, query: impl Into<String>, project_id: Option<String>, top_k: usize) -> Self {
        Self { store, query: query.into(), project_id, top_k }
    }
}

#[async_trait]
impl ContextSource for MemoryContextSource {
    fn priority(&self) -> u32 {
        priority::LONG_TERM_MEMORY
    }

    async fn gather(&self, _remaining_budget: u32) -> Vec<Section> {
        if self.query.trim().is_empty() {
            return Vec::new();
        }

        let items = self
            .store
            .search(&self.query, self.project_id.as_deref(), None, self.top_k)
            .await
            .unwrap_or_default();
        if items.is_empty() {
            return Vec::new();
        }

        let mut text = String::from("# Remembered context\n\n");
        for item in &items {
            text.push_str(&format!("- ({:?}) {}\n", item.memory_type, item.content));
        }

        vec![Section::new("long_term_memory", text.trim_end(), priority::LONG_TERM_MEMORY, true)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryType, NewMemoryItem};
    use crate::rag::embedder::HashedTfEmbedder;
    use crate::rag::types::IndexEntry;
    use sqlx::SqlitePool;

    #[tokio::test]
    async fn static_source_is_empty_for_blank_content() {
        let source = StaticSource::new("role_persona", "   ", priority::ROLE_PERSONA);
        assert!(source.gather(1000).await.is_empty());
    }

    #[tokio::test]
    async fn static_source_emits_one_section() {
        let source = StaticSource::new("role_persona", "be careful", priority::ROLE_PERSONA);
        let sections = source.gather(1000).await;
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "be careful");
    }

    #[tokio::test]
    async fn workspace_overview_reports_git_repo() {
        use std::process::Command;
        let dir = tempfile::tempdir().unwrap();
        Command::new("git").args(["init"]).current_dir(dir.path()).output().unwrap();
        Command::new("git").args(["config", "user.email", "t@example.com"]).current_dir(dir.path()).output().unwrap();
        Command::new("git").args(["config", "user.name", "T"]).current_dir(dir.path()).output().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir.path()).output().unwrap();
        Command::new("git").args(["commit", "-m", "init"]).current_dir(dir.path()).output().unwrap();

        let source = WorkspaceOverviewSource::new(dir.path());
        let sections = source.gather(1000).await;
        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.contains("Git"));
    }

    #[tokio::test]
    async fn workspace_overview_is_empty_outside_any_repo() {
        let dir = tempfile::tempdir().unwrap();
        let source = WorkspaceOverviewSource::new(dir.path());
        assert!(source.gather(1000).await.is_empty());
    }

    #[tokio::test]
    async fn rag_source_surfaces_relevant_hit() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let mut index = VectorIndex::new(pool);
        index.upsert(IndexEntry {
            id: 1,
            source: "src/auth.rs".to_string(),
            start_line: 1,
            end_line: 3,
            content: "fn authenticate_user(token: &str) -> bool { validate(token) }".to_string(),
            embedding: HashedTfEmbedder::embed_sync("fn authenticate_user(token: &str) -> bool { validate(token) }"),
        });

        let source = RagContextSource::new(
            Arc::new(Mutex::new(index)),
            Arc::new(HashedTfEmbedder::new()),
            "authenticate user token",
            5,
        );
        let sections = source.gather(1000).await;
        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.contains("src/auth.rs"));
    }

    #[tokio::test]
    async fn rag_source_is_empty_with_blank_query() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let index = VectorIndex::new(pool);
        let source = RagContextSource::new(Arc::new(Mutex::new(index)), Arc::new(HashedTfEmbedder::new()), "", 5);
        assert!(source.gather(1000).await.is_empty());
    }

    #[tokio::test]
    async fn memory_source_surfaces_matching_item() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = Arc::new(MemoryStore::new(pool));
        store.migrate().await.unwrap();
        store
            .add(NewMemoryItem {
                content: "user prefers dark mode".to_string(),
                memory_type: MemoryType::Preference,
                project_id: None,
                importance: 0.8,
                tags: vec![],
                source: "test".to_string(),
            })
            .await
            .unwrap();

        let source = MemoryContextSource::new(store, "dark mode preference", None, 5);
        let sections = source.gather(1000).await;
        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.contains("dark mode"));
    }
}
