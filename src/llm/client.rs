//! LLM client (C4): resolves a `ModelId` to a cached driver, normalizes
//! messages to wire form, and handles reasoning-model specifics (§4.2).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tracing::warn;

use crate::llm::capability::CapabilityCache;
use crate::llm::error::ProviderError;
use crate::llm::provider::copilot::{CopilotDriver, CopilotTokenSource};
use crate::llm::provider::default_chat::DefaultChatDriver;
use crate::llm::provider::third_party::ThirdPartyDriver;
use crate::llm::provider::{CompletionRequest, ProviderDriver};
use crate::llm::types::{
    CompletionResult, Content, Message, ModelId, ProviderEvent, ProviderKey, Role, ToolChoice,
    ToolDefinition,
};

const DRIVER_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("third-party provider '{0}' is not configured or disabled")]
    UnknownThirdParty(String),
}

#[derive(Debug, Clone)]
pub struct ThirdPartyProviderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
}

/// Looks up per-slug third-party provider configuration from persistence.
#[async_trait]
pub trait ThirdPartyProviderStore: Send + Sync {
    async fn lookup(&self, slug: &str) -> Option<ThirdPartyProviderConfig>;
}

pub struct LlmClientConfig {
    pub default_base_url: String,
    pub default_api_key: String,
    pub copilot_token_source: Option<Arc<dyn CopilotTokenSource>>,
    pub third_party_store: Arc<dyn ThirdPartyProviderStore>,
}

pub struct LlmClient {
    config: LlmClientConfig,
    driver_cache: moka::future::Cache<String, Arc<dyn ProviderDriver>>,
    pub capability_cache: Arc<CapabilityCache>,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Self {
        Self {
            config,
            driver_cache: moka::future::Cache::builder()
                .time_to_live(DRIVER_CACHE_TTL)
                .build(),
            capability_cache: Arc::new(CapabilityCache::new()),
        }
    }

    /// Drop all cached drivers so configuration changes propagate without restart.
    pub async fn invalidate_cache(&self) {
        self.driver_cache.invalidate_all();
    }

    async fn resolve_driver(
        &self,
        model: &ModelId,
    ) -> Result<(Arc<dyn ProviderDriver>, String), ClientError> {
        let (key, actual_model) = model.resolve();
        match key {
            ProviderKey::Default => {
                let base_url = self.config.default_base_url.clone();
                let api_key = self.config.default_api_key.clone();
                let driver = self
                    .driver_cache
                    .get_with("default".to_string(), async move {
                        Arc::new(DefaultChatDriver::new(base_url, api_key)) as Arc<dyn ProviderDriver>
                    })
                    .await;
                Ok((driver, actual_model))
            }
            ProviderKey::Copilot => {
                let Some(token_source) = self.config.copilot_token_source.clone() else {
                    return Err(ClientError::Provider(ProviderError::AuthPrecondition {
                        provider_type: "copilot".to_string(),
                    }));
                };
                let driver = self
                    .driver_cache
                    .get_with("copilot".to_string(), async move {
                        Arc::new(CopilotDriver::new(token_source)) as Arc<dyn ProviderDriver>
                    })
                    .await;
                Ok((driver, actual_model))
            }
            ProviderKey::ThirdParty(slug) => {
                match self.config.third_party_store.lookup(&slug).await {
                    Some(cfg) if cfg.enabled => {
                        let cache_key = slug.clone();
                        let driver = self
                            .driver_cache
                            .get_with(cache_key, async move {
                                Arc::new(ThirdPartyDriver::new(slug, cfg.base_url, cfg.api_key))
                                    as Arc<dyn ProviderDriver>
                            })
                            .await;
                        Ok((driver, actual_model))
                    }
                    _ => {
                        warn!(slug = %slug, "third-party provider not configured or disabled, falling through to default");
                        self.resolve_driver(&ModelId::new(actual_model)).await
                    }
                }
            }
        }
    }

    /// Normalize internal messages to the form the wire-level request
    /// builder expects, applying reasoning-model-specific system-message
    /// handling (§4.2).
    fn normalize_messages(&self, model: &ModelId, messages: &[Message]) -> Vec<Message> {
        if !model.is_reasoning_model() {
            return messages.to_vec();
        }
        messages
            .iter()
            .map(|m| {
                if m.role == Role::System {
                    let text = m.text();
                    Message {
                        role: Role::User,
                        content: Some(Content::Text(format!("[System Instructions]\n{text}"))),
                        tool_calls: None,
                        tool_call_id: None,
                        images: None,
                    }
                } else {
                    m.clone()
                }
            })
            .collect()
    }

    /// Stream a completion, handling reasoning-mode replay transparently.
    pub async fn stream(
        &self,
        model: &ModelId,
        messages: Vec<Message>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        tools: Option<Vec<ToolDefinition>>,
        tool_choice: ToolChoice,
        request_id: String,
    ) -> Result<BoxStream<'static, ProviderEvent>, ClientError> {
        let (driver, actual_model) = self.resolve_driver(model).await?;

        if let Err(e) = driver.ensure_authenticated().await {
            return Ok(stream::once(async move {
                ProviderEvent::Error(crate::llm::types::ProviderErrorMeta {
                    kind: crate::llm::types::ProviderErrorKind::AuthError,
                    status_code: None,
                    model: actual_model,
                    provider_type: driver.provider_type().to_string(),
                    message: e.to_string(),
                    rate_limit_count: None,
                    rate_limit_seconds: None,
                    wait_seconds: None,
                    max_context_tokens: None,
                    requested_tokens: None,
                })
            })
            .boxed());
        }

        let normalized = self.normalize_messages(model, &messages);
        let is_reasoning = model.is_reasoning_model();

        let request = CompletionRequest {
            messages: normalized,
            model: actual_model.clone(),
            temperature,
            max_tokens,
            tools: if is_reasoning { None } else { tools },
            tool_choice,
            request_id,
            stream: !is_reasoning,
        };

        if is_reasoning {
            let result = driver.complete(request).await?;
            self.observe_completion_usage(model, &result).await;
            return Ok(replay_as_stream(result));
        }

        match driver.stream(request).await {
            Ok(events) => Ok(events),
            Err(ProviderError::Provider(meta)) => {
                self.capability_cache.observe_error(model, &meta).await;
                Ok(stream::once(async move { ProviderEvent::Error(meta) }).boxed())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Non-streaming completion.
    pub async fn complete(
        &self,
        model: &ModelId,
        messages: Vec<Message>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        tools: Option<Vec<ToolDefinition>>,
        tool_choice: ToolChoice,
        request_id: String,
    ) -> Result<CompletionResult, ClientError> {
        let (driver, actual_model) = self.resolve_driver(model).await?;
        driver.ensure_authenticated().await?;

        let normalized = self.normalize_messages(model, &messages);
        let is_reasoning = model.is_reasoning_model();

        let request = CompletionRequest {
            messages: normalized,
            model: actual_model,
            temperature,
            max_tokens,
            tools: if is_reasoning { None } else { tools },
            tool_choice,
            request_id,
            stream: false,
        };

        match driver.complete(request).await {
            Ok(result) => {
                self.observe_completion_usage(model, &result).await;
                Ok(result)
            }
            Err(ProviderError::Provider(meta)) => {
                self.capability_cache.observe_error(model, &meta).await;
                Err(ClientError::Provider(ProviderError::Provider(meta)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn observe_completion_usage(&self, model: &ModelId, _result: &CompletionResult) {
        self.capability_cache.observe_success(model).await;
    }
}

/// Replay a non-streaming `CompletionResult` as the synthetic
/// `(thinking_delta?, content_delta?, usage)` sequence reasoning mode calls for.
fn replay_as_stream(result: CompletionResult) -> BoxStream<'static, ProviderEvent> {
    let mut events = Vec::new();
    if let Some(thinking) = result.thinking {
        if !thinking.is_empty() {
            events.push(ProviderEvent::ThinkingDelta(thinking));
        }
    }
    if let Some(content) = result.content {
        if !content.is_empty() {
            events.push(ProviderEvent::ContentDelta(content));
        }
    }
    for tool_call in result.tool_calls.into_iter().enumerate() {
        let (index, call) = tool_call;
        events.push(ProviderEvent::ToolCallDelta(crate::llm::types::ToolCallDelta {
            index,
            id: Some(call.id),
            name: Some(call.name),
            arguments_delta: Some(call.arguments.to_string()),
        }));
    }
    if let Some(usage) = result.usage {
        events.push(ProviderEvent::Usage(usage));
    }
    events.push(ProviderEvent::Finish(result.finish_reason));
    stream::iter(events).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyThirdPartyStore;

    #[async_trait]
    impl ThirdPartyProviderStore for EmptyThirdPartyStore {
        async fn lookup(&self, _slug: &str) -> Option<ThirdPartyProviderConfig> {
            None
        }
    }

    fn test_client() -> LlmClient {
        LlmClient::new(LlmClientConfig {
            default_base_url: "https://api.example.com/v1".into(),
            default_api_key: "test-key".into(),
            copilot_token_source: None,
            third_party_store: Arc::new(EmptyThirdPartyStore),
        })
    }

    #[tokio::test]
    async fn resolve_default_driver() {
        let client = test_client();
        let (_driver, actual_model) = client.resolve_driver(&ModelId::new("gpt-4o")).await.unwrap();
        assert_eq!(actual_model, "gpt-4o");
    }

    #[tokio::test]
    async fn unconfigured_third_party_falls_through_to_default() {
        let client = test_client();
        let (_driver, actual_model) = client
            .resolve_driver(&ModelId::new("acme:gpt-4o"))
            .await
            .unwrap();
        assert_eq!(actual_model, "gpt-4o");
    }

    #[tokio::test]
    async fn copilot_without_token_source_is_auth_error() {
        let client = test_client();
        let result = client.resolve_driver(&ModelId::new("copilot:gpt-4o")).await;
        assert!(matches!(
            result,
            Err(ClientError::Provider(ProviderError::AuthPrecondition { .. }))
        ));
    }

    #[test]
    fn reasoning_system_message_becomes_prefixed_user_message() {
        let client = test_client();
        let model = ModelId::new("o3-mini");
        let messages = vec![Message::system("be concise"), Message::user("hi")];
        let normalized = client.normalize_messages(&model, &messages);
        assert_eq!(normalized[0].role, Role::User);
        assert!(normalized[0].text().starts_with("[System Instructions]"));
    }
}
