//! Background indexer (§4.7): incremental workspace scan feeding the vector
//! index, grounded on the teacher's `.gitignore`-aware walking idiom
//! (`crates/mira-server/src/project_files/walker.rs`'s `ignore::WalkBuilder`
//! usage) rather than a hand-rolled directory recursion.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ignore::WalkBuilder;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::rag::chunker::{chunk_code, chunk_text};
use crate::rag::embedder::{Embedder, HashedTfEmbedder};
use crate::rag::index::VectorIndex;
use crate::rag::types::IndexEntry;

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
const YIELD_BATCH: usize = 20;
const MAX_FILE_BYTES: u64 = 512 * 1024;
const MAX_CHUNK_TOKENS: usize = 400;

const NOISE_DIRS: &[&str] = &[
    "target", "node_modules", ".git", "dist", "build", ".next", ".venv", "venv", "__pycache__", ".cache",
];

const CODE_EXTENSIONS: &[&str] = &["rs", "py", "ts", "tsx", "js", "jsx", "mjs", "go"];

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("failed to walk workspace: {0}")]
    Walk(#[from] ignore::Error),
    #[error(transparent)]
    Index(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexerStats {
    pub files_scanned: usize,
    pub files_reindexed: usize,
    pub chunks_upserted: usize,
}

/// Walks a workspace on an interval, reindexing only files whose mtime has
/// advanced since the last pass.
pub struct BackgroundIndexer {
    workspace_root: std::path::PathBuf,
    index: Arc<Mutex<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    known_mtimes: Mutex<HashMap<String, SystemTime>>,
}

impl BackgroundIndexer {
    pub fn new(workspace_root: impl Into<std::path::PathBuf>, index: Arc<Mutex<VectorIndex>>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            index,
            embedder,
            known_mtimes: Mutex::new(HashMap::new()),
        }
    }

    /// Run one incremental pass over the workspace.
    pub async fn run_once(&self) -> Result<IndexerStats, IndexerError> {
        let mut stats = IndexerStats::default();
        let root = self.workspace_root.clone();

        let walker = WalkBuilder::new(&root)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .filter_entry(|entry| {
                !entry
                    .file_name()
                    .to_str()
                    .map(|name| NOISE_DIRS.contains(&name))
                    .unwrap_or(false)
            })
            .build();

        let mut batch_count = 0usize;
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            let Ok(metadata) = path.metadata() else { continue };
            if metadata.len() > MAX_FILE_BYTES {
                continue;
            }

            stats.files_scanned += 1;
            let relative = path.strip_prefix(&root).unwrap_or(path).to_string_lossy().to_string();
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            let needs_reindex = {
                let known = self.known_mtimes.lock().await;
                known.get(&relative).is_none_or(|prev| modified > *prev)
            };

            if needs_reindex {
                if let Err(e) = self.reindex_file(path, &relative).await {
                    warn!(path = %relative, error = %e, "failed to reindex file");
                } else {
                    stats.files_reindexed += 1;
                    self.known_mtimes.lock().await.insert(relative, modified);
                }
            }

            batch_count += 1;
            if batch_count % YIELD_BATCH == 0 {
                tokio::task::yield_now().await;
            }
        }

        {
            let mut index = self.index.lock().await;
            index.flush().await?;
        }

        info!(files_scanned = stats.files_scanned, files_reindexed = stats.files_reindexed, "background index pass complete");
        Ok(stats)
    }

    async fn reindex_file(&self, path: &Path, relative: &str) -> Result<(), IndexerError> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Ok(());
        };

        let is_code = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| CODE_EXTENSIONS.contains(&ext))
            .unwrap_or(false);

        let chunks = if is_code {
            chunk_code(relative, &content, MAX_CHUNK_TOKENS)
        } else {
            chunk_text(relative, &content, MAX_CHUNK_TOKENS)
        };

        let mut index = self.index.lock().await;
        index.remove_by_source(relative);

        for chunk in chunks {
            let embedding = match self.embedder.embed(&chunk.content).await {
                Ok(v) => v,
                Err(e) => {
                    debug!(source = %chunk.source, error = %e, "provider embed failed, using hashed-bucket fallback");
                    HashedTfEmbedder::embed_sync(&chunk.content)
                }
            };

            index.upsert(IndexEntry {
                id: crate::rag::hash::chunk_id(&chunk.source, chunk.start_line, chunk.end_line),
                source: chunk.source,
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                content: chunk.content,
                embedding,
            });
        }

        Ok(())
    }

    /// Run `run_once` on a fixed interval until the returned handle is
    /// dropped or aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "background index pass failed");
                }
            }
        })
    }
}
