//! Crate-wide error aggregator (ambient stack): a `thiserror` enum over
//! each subsystem's own typed error, for call sites that cross module
//! boundaries (lib facade, CLI wiring) and want `?` without widening every
//! fallible call to `anyhow::Error`.
//!
//! Each subsystem keeps its own typed error (`ProviderError`, `ToolError`,
//! `McpError`, ...) per the teacher's split between `anyhow` glue code and
//! a typed error at API boundaries (`src/api/error.rs`'s `ApiError`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Provider(#[from] crate::llm::error::ProviderError),
    #[error(transparent)]
    Client(#[from] crate::llm::client::ClientError),
    #[error(transparent)]
    Tool(#[from] crate::tools::executor::ToolError),
    #[error(transparent)]
    Mcp(#[from] crate::mcp::connection::McpError),
    #[error(transparent)]
    McpCall(#[from] crate::mcp::registry::McpCallError),
    #[error(transparent)]
    Summarize(#[from] crate::context::window::SummarizeError),
    #[error(transparent)]
    Embed(#[from] crate::rag::embedder::EmbedError),
    #[error(transparent)]
    Indexer(#[from] crate::rag::indexer::IndexerError),
    #[error(transparent)]
    Memory(#[from] crate::memory::MemoryError),
    #[error(transparent)]
    Skill(#[from] crate::skills::SkillError),
    #[error(transparent)]
    Vcs(#[from] crate::vcs::VcsError),
}

pub type CoreResult<T> = Result<T, CoreError>;
