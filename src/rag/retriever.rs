//! Hybrid retriever (§4.7): vector search plus a BM25-like (tf-only)
//! keyword pass, merged by chunk id.
//!
//! The teacher's `hybrid_search` (`crates/mira-server/src/search/semantic.rs`)
//! picks one method or the other based on a quality threshold; this merges
//! both when a result appears in each, per the design's weighted-combine
//! rule.

use std::collections::HashMap;

use crate::rag::embedder::{Embedder, HashedTfEmbedder};
use crate::rag::index::VectorIndex;
use crate::rag::types::{SearchHit, SearchLabel};

const VEC_WEIGHT: f32 = 0.7;
const KW_WEIGHT: f32 = 0.3;
const MIN_SCORE: f32 = 0.1;

pub struct HybridRetriever<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn Embedder,
}

impl<'a> HybridRetriever<'a> {
    pub fn new(index: &'a VectorIndex, embedder: &'a dyn Embedder) -> Self {
        Self { index, embedder }
    }

    pub async fn retrieve(&self, query: &str, top_k: usize, source_prefix: Option<&str>) -> Vec<SearchHit> {
        let fetch_k = top_k * 2;

        let query_embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(_) => HashedTfEmbedder::embed_sync(query),
        };
        let vector_hits = self.index.search(&query_embedding, fetch_k, source_prefix);
        let keyword_hits = keyword_search(self.index, query, fetch_k, source_prefix);

        let mut merged: HashMap<u64, SearchHit> = HashMap::new();
        for hit in vector_hits {
            merged.insert(hit.id, SearchHit { score: hit.score * VEC_WEIGHT, ..hit });
        }
        for hit in keyword_hits {
            merged
                .entry(hit.id)
                .and_modify(|existing| {
                    existing.score += hit.score * KW_WEIGHT;
                    existing.label = SearchLabel::Hybrid;
                })
                .or_insert(SearchHit { score: hit.score * KW_WEIGHT, label: SearchLabel::Keyword, ..hit });
        }

        let mut results: Vec<SearchHit> = merged.into_values().filter(|h| h.score >= MIN_SCORE).collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }
}

/// Plain term-frequency keyword search: score is the fraction of a
/// document's tokens that match a query token.
fn keyword_search(index: &VectorIndex, query: &str, top_k: usize, source_prefix: Option<&str>) -> Vec<SearchHit> {
    let query_tokens: std::collections::HashSet<String> = HashedTfEmbedder::tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<SearchHit> = index
        .entries()
        .iter()
        .filter(|e| source_prefix.is_none_or(|prefix| e.source.starts_with(prefix)))
        .filter_map(|entry| {
            let doc_tokens = HashedTfEmbedder::tokenize(&entry.content);
            if doc_tokens.is_empty() {
                return None;
            }
            let matches = doc_tokens.iter().filter(|t| query_tokens.contains(*t)).count();
            if matches == 0 {
                return None;
            }
            let score = matches as f32 / doc_tokens.len() as f32;
            Some(SearchHit {
                id: entry.id,
                source: entry.source.clone(),
                start_line: entry.start_line,
                end_line: entry.end_line,
                content: entry.content.clone(),
                score,
                label: SearchLabel::Keyword,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::IndexEntry;
    use sqlx::SqlitePool;

    struct StubEmbedder;

    #[async_trait::async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::rag::embedder::EmbedError> {
            Ok(HashedTfEmbedder::embed_sync(text))
        }
    }

    async fn seeded_index() -> VectorIndex {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let mut index = VectorIndex::new(pool);
        index.upsert(IndexEntry {
            id: 1,
            source: "src/auth.rs".to_string(),
            start_line: 1,
            end_line: 10,
            content: "fn authenticate_user(token: &str) -> bool { validate(token) }".to_string(),
            embedding: HashedTfEmbedder::embed_sync("fn authenticate_user(token: &str) -> bool { validate(token) }"),
        });
        index.upsert(IndexEntry {
            id: 2,
            source: "src/render.rs".to_string(),
            start_line: 1,
            end_line: 10,
            content: "fn render_frame(buffer: &mut Buffer) { draw(buffer) }".to_string(),
            embedding: HashedTfEmbedder::embed_sync("fn render_frame(buffer: &mut Buffer) { draw(buffer) }"),
        });
        index
    }

    #[tokio::test]
    async fn retrieves_relevant_hit_above_irrelevant_one() {
        let index = seeded_index().await;
        let embedder = StubEmbedder;
        let retriever = HybridRetriever::new(&index, &embedder);

        let hits = retriever.retrieve("authenticate user token", 5, None).await;
        assert!(!hits.is_empty());
        assert_eq!(hits[0].source, "src/auth.rs");
    }

    #[tokio::test]
    async fn hit_in_both_vector_and_keyword_is_labeled_hybrid() {
        let index = seeded_index().await;
        let embedder = StubEmbedder;
        let retriever = HybridRetriever::new(&index, &embedder);

        let hits = retriever.retrieve("authenticate user token", 5, None).await;
        let top = &hits[0];
        assert!(matches!(top.label, SearchLabel::Hybrid | SearchLabel::Vector));
    }
}
