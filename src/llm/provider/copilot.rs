//! Copilot-style provider family: identical wire format plus editor
//! identification headers, a stable session id, a machine-id hash, and a
//! per-request id. Token is obtained from an external session manager on
//! each call (§4.1).

use async_trait::async_trait;
use futures::stream::BoxStream;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::llm::error::{classify_error, ProviderError};
use crate::llm::provider::{
    parse_chat_response, parse_chat_sse, to_wire_messages, to_wire_tool_choice, to_wire_tools,
    CompletionRequest, ProviderDriver, WireRequest, WireResponse,
};
use crate::llm::types::CompletionResult;

const COPILOT_CHAT_URL: &str = "https://api.githubcopilot.com/chat/completions";
const EDITOR_VERSION: &str = "Neovim/0.10.0";
const EDITOR_PLUGIN_VERSION: &str = "forgemind/0.1.0";

/// Produces a fresh Copilot bearer token on demand. Implementations may
/// cache internally; the driver always asks before each request since the
/// token is short-lived.
#[async_trait]
pub trait CopilotTokenSource: Send + Sync {
    async fn token(&self) -> Result<String, ProviderError>;
}

pub struct CopilotDriver {
    client: reqwest::Client,
    token_source: std::sync::Arc<dyn CopilotTokenSource>,
    /// Stable for the lifetime of this driver instance.
    session_id: String,
    machine_id: String,
}

impl CopilotDriver {
    pub fn new(token_source: std::sync::Arc<dyn CopilotTokenSource>) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let machine_id = machine_id_hash();
        Self {
            client: reqwest::Client::new(),
            token_source,
            session_id,
            machine_id,
        }
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

fn machine_id_hash() -> String {
    let seed = format!("{}-{}", hostname(), std::process::id());
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "forgemind-host".to_string())
}

#[async_trait]
impl ProviderDriver for CopilotDriver {
    fn provider_type(&self) -> &'static str {
        "copilot"
    }

    async fn ensure_authenticated(&self) -> Result<(), ProviderError> {
        self.token_source.token().await.map(|_| ())
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, crate::llm::types::ProviderEvent>, ProviderError> {
        let token = self.token_source.token().await?;
        let model = request.model.clone();
        let body = self.build_request(&request, true);

        let response = self
            .client
            .post(COPILOT_CHAT_URL)
            .bearer_auth(&token)
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .header("Copilot-Session-Id", &self.session_id)
            .header("X-Copilot-Machine-Id", &self.machine_id)
            .header("X-Request-Id", request.request_id.clone())
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
        let token = self.token_source.token().await?;
        let model = request.model.clone();
        let body = self.build_request(&request, false);

        let response = self
            .client
            .post(COPILOT_CHAT_URL)
            .bearer_auth(&token)
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .header("Copilot-Session-Id", &self.session_id)
            .header("X-Copilot-Machine-Id", &self.machine_id)
            .header("X-Request-Id", request.request_id.clone())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_id_is_stable_for_process_lifetime() {
        assert_eq!(machine_id_hash(), machine_id_hash());
    }
}
