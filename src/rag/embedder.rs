//! Embedder (§4.7): a provider-backed embedding endpoint, with a
//! hashed-bucket TF fallback when no provider is configured or the call
//! fails.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::rag::hash::stable_hash;

pub const EMBEDDING_DIM: usize = 256;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("embedding provider returned no vectors")]
    Empty,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Calls a configured embedding endpoint (OpenAI-compatible `/embeddings`).
pub struct ProviderEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl ProviderEmbedder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response: EmbeddingResponse = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.data.into_iter().next().map(|d| d.embedding).ok_or(EmbedError::Empty)
    }
}

/// Hashed-bucket term-frequency embedder, used when no provider is
/// configured or as a fallback after a provider call fails.
pub struct HashedTfEmbedder;

impl HashedTfEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Tokenize into lowercased ASCII words plus individual CJK characters.
    pub(crate) fn tokenize(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut word = String::new();
        for ch in text.chars() {
            if ch.is_ascii_alphanumeric() {
                word.push(ch.to_ascii_lowercase());
            } else {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
                if is_cjk(ch) {
                    tokens.push(ch.to_string());
                }
            }
        }
        if !word.is_empty() {
            tokens.push(word);
        }
        tokens
    }

    pub fn embed_sync(text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; EMBEDDING_DIM];
        }

        let mut counts = vec![0u32; EMBEDDING_DIM];
        for token in &tokens {
            let bucket = (stable_hash(token) % EMBEDDING_DIM as u64) as usize;
            counts[bucket] += 1;
        }

        let total = tokens.len() as f32;
        let mut vector: Vec<f32> = counts.iter().map(|c| *c as f32 / total).collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashedTfEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashedTfEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(Self::embed_sync(text))
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x30FF | 0xAC00..=0xD7A3
    )
}

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_l2_normalized() {
        let vector = HashedTfEmbedder::embed_sync("the quick brown fox jumps over the lazy dog");
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn cjk_characters_are_tokenized_individually() {
        let tokens = HashedTfEmbedder::tokenize("你好世界");
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn identical_text_has_cosine_similarity_one() {
        let v = HashedTfEmbedder::embed_sync("identical input text");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let v = HashedTfEmbedder::embed_sync("");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
