//! Built-in tool implementations (§4.3).

pub mod ask_user;
pub mod get_file_tree;
pub mod list_directory;
pub mod read_file;
pub mod run_command;
pub mod search_text;
pub mod sensitive_paths;

use serde_json::json;

use crate::llm::types::ToolDefinition;

/// The fixed set of built-in tool definitions surfaced to the LLM.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a file's contents, optionally a line range.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "start_line": {"type": "integer"},
                    "end_line": {"type": "integer"}
                },
                "required": ["path"]
            }),
            required_permissions: vec!["read_source".into()],
        },
        ToolDefinition {
            name: "search_text".into(),
            description: "Search the workspace for a text or regex pattern.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "is_regex": {"type": "boolean"},
                    "include_pattern": {"type": "string"}
                },
                "required": ["query"]
            }),
            required_permissions: vec!["search".into()],
        },
        ToolDefinition {
            name: "list_directory".into(),
            description: "List the contents of a directory.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}}
            }),
            required_permissions: vec!["read_source".into()],
        },
        ToolDefinition {
            name: "get_file_tree".into(),
            description: "Render a depth-capped directory tree.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "max_depth": {"type": "integer"}
                }
            }),
            required_permissions: vec!["tree".into()],
        },
        ToolDefinition {
            name: "ask_user".into(),
            description: "Ask the user one or more clarifying questions.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "questions": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["questions"]
            }),
            required_permissions: vec!["ask_user".into()],
        },
        ToolDefinition {
            name: "run_command".into(),
            description: "Run a shell command in the workspace.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"]
            }),
            required_permissions: vec!["execute_readonly_command".into()],
        },
    ]
}
