//! Third-party OpenAI-compatible provider family: base URL and key read
//! from per-slug configuration, otherwise identical wire format (§4.1).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::llm::error::{classify_error, ProviderError};
use crate::llm::provider::{
    parse_chat_response, parse_chat_sse, to_wire_messages, to_wire_tool_choice, to_wire_tools,
    CompletionRequest, ProviderDriver, WireRequest, WireResponse,
};
use crate::llm::types::CompletionResult;

pub struct ThirdPartyDriver {
    client: reqwest::Client,
    slug: String,
    base_url: String,
    api_key: String,
}

impl ThirdPartyDriver {
    pub fn new(slug: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            slug: slug.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> WireRequest {
        WireRequest {
            model: request.model.clone(),
            messages: to_wire_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: to_wire_tools(&request.tools),
            tool_choice: to_wire_tool_choice(request.tool_choice),
            stream,
        }
    }
}

#[async_trait]
impl ProviderDriver for ThirdPartyDriver {
    fn provider_type(&self) -> &'static str {
        "third_party"
    }

    async fn ensure_authenticated(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::AuthPrecondition {
                provider_type: format!("third_party:{}", self.slug),
            });
        }
        Ok(())
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, crate::llm::types::ProviderEvent>, ProviderError> {
        self.ensure_authenticated().await?;
        let model = request.model.clone();
        let body = self.build_request(&request, true);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Provider(classify_error(
                status,
                &text,
                &model,
                self.provider_type(),
            )));
        }

        Ok(parse_chat_sse(response, model, self.provider_type()))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResult, ProviderError> {
        self.ensure_authenticated().await?;
        let model = request.model.clone();
        let body = self.build_request(&request, false);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Provider(classify_error(
                status,
                &text,
                &model,
                self.provider_type(),
            )));
        }

        let wire: WireResponse = response.json().await?;
        if let Some(error) = wire.error {
            return Err(ProviderError::Provider(classify_error(
                0,
                &error.message,
                &model,
                self.provider_type(),
            )));
        }
        Ok(parse_chat_response(wire))
    }
}
