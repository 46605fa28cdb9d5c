//! Agent events (§3, §6): the event contract emitted by one agent run,
//! serialisable to `{type, ...payload}` compatible with an SSE stream.

use serde::Serialize;
use serde_json::Value;

use crate::llm::types::{ProviderErrorMeta, Usage};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Content { content: String },
    Thinking { content: String },
    ToolCallStart { tool_call: ToolCallStart },
    ToolCall { tool_call: ToolCallInfo },
    ToolResult {
        tool_call_id: String,
        name: String,
        arguments: Value,
        result: String,
        duration_ms: u64,
    },
    ToolError {
        tool_call_id: String,
        name: String,
        error: String,
    },
    Usage { usage: Usage },
    Truncated,
    AskUserPending,
    Error {
        error: String,
        error_meta: Option<ProviderErrorMeta>,
    },
    PlanUpdate { plan: Value },
    Reflection {
        reflection: String,
        action: ReflectionAction,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallStart {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallInfo {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionAction {
    Continue,
    Adjust,
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_event_serializes_with_type_tag() {
        let event = AgentEvent::Content { content: "hi".to_string() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn tool_result_event_carries_duration_ms() {
        let event = AgentEvent::ToolResult {
            tool_call_id: "1".to_string(),
            name: "read_file".to_string(),
            arguments: serde_json::json!({"path": "a.rs"}),
            result: "contents".to_string(),
            duration_ms: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["duration_ms"], 12);
    }
}
