//! Core data model shared by provider drivers, the LLM client, and the agent runtime.
//!
//! Mirrors the shapes in the design's data model: `Message`, `ToolCall`, `ModelId`,
//! `ProviderEvent`. Wire-format conversion lives in the drivers and the client's
//! normalization step, not here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single message in a conversation.
///
/// Insertion order in a `Vec<Message>` carries conversation order. Assistant
/// messages with `tool_calls` carry `content = None` and a non-empty ordered
/// list of tool calls; tool messages carry `tool_call_id` matching one of
/// those calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(Content::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
            images: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(Content::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
            images: None,
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(Content::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
            images: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            images: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(Content::Text(text.into())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            images: None,
        }
    }

    /// Rough text view of this message's content, for token estimation and trimming.
    pub fn text(&self) -> String {
        match &self.content {
            Some(Content::Text(s)) => s.clone(),
            Some(Content::Structured(v)) => v.to_string(),
            None => String::new(),
        }
    }

    pub fn with_text(&self, text: String) -> Self {
        let mut out = self.clone();
        out.content = Some(Content::Text(text));
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub mime_type: String,
    /// Base64-encoded bytes, without the `data:` prefix.
    pub data: String,
}

/// A tool call emitted by the model. `id` is provider-assigned and opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    /// Identity used for duplicate-call suppression: `name || canonical-json(arguments)`.
    pub fn dedup_key(&self) -> String {
        format!("{}||{}", self.name, canonical_json(&self.arguments))
    }
}

/// Canonicalize a JSON value by sorting object keys recursively, so that
/// semantically-identical arguments compare equal regardless of key order.
pub fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serde_json::Map::new();
                for (k, v) in entries {
                    out.insert(k.clone(), sorted(v));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// A model identifier: a bare name (default provider), `copilot:<name>`, or
/// `<slug>:<name>` (third-party provider resolved via persistence).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId(pub String);

/// Where a `ModelId` resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKey {
    Default,
    Copilot,
    ThirdParty(String),
}

impl ModelId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Resolve to a provider key plus the model name to send on the wire.
    pub fn resolve(&self) -> (ProviderKey, String) {
        if let Some(rest) = self.0.strip_prefix("copilot:") {
            return (ProviderKey::Copilot, rest.to_string());
        }
        if let Some((slug, rest)) = self.0.split_once(':') {
            return (ProviderKey::ThirdParty(slug.to_string()), rest.to_string());
        }
        (ProviderKey::Default, self.0.clone())
    }

    /// Reasoning models are detected by name-prefix match on `{o1, o3, o4}`
    /// (case-insensitive), after stripping any provider prefix.
    pub fn is_reasoning_model(&self) -> bool {
        let (_, actual) = self.resolve();
        let lower = actual.to_ascii_lowercase();
        ["o1", "o3", "o4"].iter().any(|p| lower.starts_with(p))
    }
}

/// A streamed event from a provider driver.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    ContentDelta(String),
    ThinkingDelta(String),
    ToolCallDelta(ToolCallDelta),
    Usage(Usage),
    Finish(FinishReason),
    Error(ProviderErrorMeta),
}

/// Identity of a streamed tool-call delta is the `index` within one response;
/// `id`/`name` arrive on the first delta of that index, `arguments_delta`
/// arrives incrementally and must be concatenated in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FinishReason {
    #[default]
    Stop,
    ToolCalls,
    Length,
    Other,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub reasoning_tokens: Option<u32>,
}

/// Result of a non-streaming `complete()` call.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub content: Option<String>,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub finish_reason: FinishReason,
}

/// Structured error classification, shared by all three provider families.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderErrorMeta {
    pub kind: ProviderErrorKind,
    pub status_code: Option<u16>,
    pub model: String,
    pub provider_type: String,
    pub message: String,
    pub rate_limit_count: Option<u32>,
    pub rate_limit_seconds: Option<u32>,
    pub wait_seconds: Option<u32>,
    pub max_context_tokens: Option<u32>,
    pub requested_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimit,
    ContextOverflow,
    AuthError,
    Unknown,
}

/// Tool definition surfaced to the LLM and consulted by the executor for
/// permission filtering. Identity is `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    #[serde(default)]
    pub required_permissions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    Required,
    None,
}
