//! Provider driver trait and the shared chat-completions wire format (C3).
//!
//! All three families speak the same `choices[0].delta` SSE shape (§4.1), so
//! one parser serves all of them; family differences live entirely in how
//! each driver builds its request (auth headers, base URL, extra headers).

pub mod copilot;
pub mod default_chat;
pub mod third_party;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::llm::error::{classify_error, ProviderError};
use crate::llm::types::{
    CompletionResult, FinishReason, Message, ProviderEvent, ToolCallDelta, ToolChoice,
    ToolDefinition, Usage,
};

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: ToolChoice,
    pub request_id: String,
    pub stream: bool,
}

#[async_trait]
pub trait ProviderDriver: Send + Sync {
    /// `"default" | "copilot" | "third_party"`, carried on error metadata.
    fn provider_type(&self) -> &'static str;

    /// Verify authentication is usable before issuing a request.
    async fn ensure_authenticated(&self) -> Result<(), ProviderError>;

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, ProviderEvent>, ProviderError>;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResult, ProviderError>;
}

// ---------------------------------------------------------------------------
// Shared wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunctionDef,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    pub choices: Option<Vec<WireChoice>>,
    pub usage: Option<WireUsage>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    pub message: Option<WireResponseMessage>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseMessage {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Option<Vec<WireResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseToolCall {
    pub id: String,
    pub function: WireResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponseFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub completion_tokens_details: Option<WireCompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCompletionTokensDetails {
    pub reasoning_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    pub message: String,
}

#[derive(Debug, Deserialize, Default)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    #[serde(alias = "thinking")]
    thinking_alias: Option<String>,
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

pub(crate) fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                crate::llm::types::Role::System => "system",
                crate::llm::types::Role::User => "user",
                crate::llm::types::Role::Assistant => "assistant",
                crate::llm::types::Role::Tool => "tool",
            };
            let tool_calls = m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: c.id.clone(),
                        kind: "function",
                        function: WireFunctionCall {
                            name: c.name.clone(),
                            arguments: c.arguments.to_string(),
                        },
                    })
                    .collect()
            });
            let content = if tool_calls.is_some() {
                None
            } else {
                Some(content_to_wire(m))
            };
            WireMessage {
                role,
                content,
                tool_calls,
                tool_call_id: m.tool_call_id.clone(),
            }
        })
        .collect()
}

fn content_to_wire(message: &Message) -> serde_json::Value {
    if let Some(images) = &message.images {
        if !images.is_empty() {
            let mut parts = vec![serde_json::json!({"type": "text", "text": message.text()})];
            for image in images {
                parts.push(serde_json::json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{};base64,{}", image.mime_type, image.data),
                    }
                }));
            }
            return serde_json::Value::Array(parts);
        }
    }
    serde_json::Value::String(message.text())
}

pub(crate) fn to_wire_tools(tools: &Option<Vec<ToolDefinition>>) -> Option<Vec<WireTool>> {
    tools.as_ref().map(|defs| {
        defs.iter()
            .map(|d| WireTool {
                kind: "function",
                function: WireFunctionDef {
                    name: d.name.clone(),
                    description: d.description.clone(),
                    parameters: d.parameters.clone(),
                },
            })
            .collect()
    })
}

pub(crate) fn to_wire_tool_choice(choice: ToolChoice) -> Option<&'static str> {
    match choice {
        ToolChoice::Auto => None,
        ToolChoice::Required => Some("required"),
        ToolChoice::None => Some("none"),
    }
}

fn finish_reason_from_str(s: &str) -> FinishReason {
    match s {
        "tool_calls" => FinishReason::ToolCalls,
        "length" => FinishReason::Length,
        "stop" => FinishReason::Stop,
        _ => FinishReason::Other,
    }
}

/// Parse a chat-completions SSE body into an ordered `ProviderEvent` stream,
/// per §4.1: for each `data:` line, emit (in order) `finish_reason`,
/// `thinking_delta`, `content_delta`, then each tool-call delta; a top-level
/// `usage` object emits a `usage` event.
pub(crate) fn parse_chat_sse(
    response: reqwest::Response,
    model: String,
    provider_type: &'static str,
) -> BoxStream<'static, ProviderEvent> {
    use futures::StreamExt;

    let stream = async_stream::stream! {
        let mut bytes_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield ProviderEvent::Error(classify_error(0, &e.to_string(), &model, provider_type));
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() {
                    continue;
                }
                let Some(json_str) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                    continue;
                };
                if json_str.trim() == "[DONE]" {
                    return;
                }

                let parsed: Result<StreamChunk, _> = serde_json::from_str(json_str);
                let chunk = match parsed {
                    Ok(c) => c,
                    Err(_) => continue,
                };

                if let Some(choices) = chunk.choices {
                    for choice in choices {
                        if let Some(finish_reason) = &choice.finish_reason {
                            yield ProviderEvent::Finish(finish_reason_from_str(finish_reason));
                        }
                        if let Some(delta) = choice.delta {
                            let thinking = delta.reasoning_content.or(delta.thinking_alias);
                            if let Some(thinking) = thinking {
                                if !thinking.is_empty() {
                                    yield ProviderEvent::ThinkingDelta(thinking);
                                }
                            }
                            if let Some(content) = delta.content {
                                if !content.is_empty() {
                                    yield ProviderEvent::ContentDelta(content);
                                }
                            }
                            if let Some(tool_calls) = delta.tool_calls {
                                for tc in tool_calls {
                                    yield ProviderEvent::ToolCallDelta(ToolCallDelta {
                                        index: tc.index,
                                        id: tc.id,
                                        name: tc.function.as_ref().and_then(|f| f.name.clone()),
                                        arguments_delta: tc.function.and_then(|f| f.arguments),
                                    });
                                }
                            }
                        }
                    }
                }
                if let Some(usage) = chunk.usage {
                    yield ProviderEvent::Usage(Usage {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        total_tokens: usage.total_tokens,
                        reasoning_tokens: usage.completion_tokens_details.and_then(|d| d.reasoning_tokens),
                    });
                }
            }
        }
    };

    stream.boxed()
}

/// Parse a non-streaming chat-completions response into a `CompletionResult`.
pub(crate) fn parse_chat_response(body: WireResponse) -> CompletionResult {
    let choice = body.choices.and_then(|c| c.into_iter().next());
    let finish_reason = choice
        .as_ref()
        .and_then(|c| c.finish_reason.as_deref())
        .map(finish_reason_from_str)
        .unwrap_or_default();
    let message = choice.and_then(|c| c.message);
    let tool_calls = message
        .as_ref()
        .and_then(|m| m.tool_calls.as_ref())
        .map(|calls| {
            calls
                .iter()
                .map(|c| crate::llm::types::ToolCall {
                    id: c.id.clone(),
                    name: c.function.name.clone(),
                    arguments: serde_json::from_str(&c.function.arguments)
                        .unwrap_or(serde_json::Value::Null),
                })
                .collect()
        })
        .unwrap_or_default();
    CompletionResult {
        content: message.as_ref().and_then(|m| m.content.clone()),
        thinking: message.and_then(|m| m.reasoning_content),
        tool_calls,
        usage: body.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            reasoning_tokens: u.completion_tokens_details.and_then(|d| d.reasoning_tokens),
        }),
        finish_reason,
    }
}
