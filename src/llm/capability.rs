//! Model capability cache (C2).
//!
//! Tracks per-model context window size and feature flags, learning from
//! error responses the way the design calls for ("capability cache...
//! learns from error responses"): a `context_overflow` error narrows the
//! known `max_context_tokens` down to the value the provider actually
//! reported; an `auth_error` marks the model unusable until the next
//! successful call.

use std::time::Duration;

use moka::future::Cache;

use crate::llm::types::{ModelId, ProviderErrorMeta, ProviderErrorKind};

const DEFAULT_MAX_CONTEXT_TOKENS: u32 = 128_000;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4_096;
const CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct ModelCapability {
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
    pub supports_tools: bool,
    pub is_reasoning: bool,
    pub auth_ok: bool,
}

impl ModelCapability {
    fn default_for(model: &ModelId) -> Self {
        let is_reasoning = model.is_reasoning_model();
        Self {
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            supports_tools: !is_reasoning,
            is_reasoning,
            auth_ok: true,
        }
    }
}

/// Caches `ModelCapability` by model id string, seeded with defaults on
/// first read and narrowed by observed error responses thereafter.
pub struct CapabilityCache {
    inner: Cache<String, ModelCapability>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().time_to_live(CACHE_TTL).build(),
        }
    }

    pub async fn get(&self, model: &ModelId) -> ModelCapability {
        if let Some(existing) = self.inner.get(&model.0).await {
            return existing;
        }
        let fresh = ModelCapability::default_for(model);
        self.inner.insert(model.0.clone(), fresh.clone()).await;
        fresh
    }

    /// Update the cached capability from an observed provider error.
    pub async fn observe_error(&self, model: &ModelId, error: &ProviderErrorMeta) {
        let mut capability = self.get(model).await;
        match error.kind {
            ProviderErrorKind::ContextOverflow => {
                if let Some(max_context) = error.max_context_tokens {
                    capability.max_context_tokens = max_context;
                }
            }
            ProviderErrorKind::AuthError => {
                capability.auth_ok = false;
            }
            _ => {}
        }
        self.inner.insert(model.0.clone(), capability).await;
    }

    /// Mark a model as authenticated again after a successful call.
    pub async fn observe_success(&self, model: &ModelId) {
        let mut capability = self.get(model).await;
        if !capability.auth_ok {
            capability.auth_ok = true;
            self.inner.insert(model.0.clone(), capability).await;
        }
    }

    pub async fn invalidate(&self, model: &ModelId) {
        self.inner.invalidate(&model.0).await;
    }

    pub async fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self::new()
    }
}
