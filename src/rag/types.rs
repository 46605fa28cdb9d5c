//! Shared data shapes for the RAG engine (§4.7).

use serde::{Deserialize, Serialize};

/// A contiguous slice of a source document, prior to embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
}

/// One entry in the vector index: a chunk plus its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: u64,
    pub source: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLabel {
    Vector,
    Keyword,
    Hybrid,
}

impl SearchLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchLabel::Vector => "vector",
            SearchLabel::Keyword => "keyword",
            SearchLabel::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: u64,
    pub source: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub score: f32,
    pub label: SearchLabel,
}
