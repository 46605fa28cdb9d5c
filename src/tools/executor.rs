//! Tool executor (C5): permission checks, command approval gating, and
//! concurrent dispatch.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;

use crate::llm::types::ToolCall;
use crate::mcp::registry::{McpCallError, McpRegistry};
use crate::tools::builtin::{
    ask_user, get_file_tree, list_directory, read_file, run_command, search_text,
};
use crate::tools::registry::ToolRegistry;

/// Approval scope granted for a write command, per §4.3. `Rule`-scoped
/// approvals are reusable across structurally-similar commands (same
/// binary, same flag set) rather than byte-identical commands only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalScope {
    Once,
    Session,
    Project,
    Permanent,
    Rule,
}

impl ApprovalScope {
    /// Does an approval granted for `original_command` under this scope
    /// also cover `future_command`?
    pub fn permits(&self, original_command: &str, future_command: &str) -> bool {
        match self {
            ApprovalScope::Once => future_command == original_command,
            ApprovalScope::Rule => command_signature(original_command) == command_signature(future_command),
            ApprovalScope::Session | ApprovalScope::Project | ApprovalScope::Permanent => true,
        }
    }
}

/// Structural signature used by `Rule` scope: the binary plus its sorted
/// flag tokens, ignoring positional arguments.
fn command_signature(command: &str) -> (String, Vec<String>) {
    let mut tokens = command.split_whitespace();
    let binary = tokens.next().unwrap_or("").to_string();
    let mut flags: Vec<String> = tokens.filter(|t| t.starts_with('-')).map(|t| t.to_string()).collect();
    flags.sort();
    (binary, flags)
}

#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub scope: ApprovalScope,
    pub reason: Option<String>,
}

/// Caller-supplied async approval function invoked when a write command is
/// requested and `execute_command` is granted. No approval function present
/// means the executor runs the command directly (policy decision per §4.3).
#[async_trait]
pub trait ApprovalCallback: Send + Sync {
    async fn request_approval(&self, command: &str) -> ApprovalDecision;
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("missing required permission for tool '{tool}': {permission}")]
    MissingPermission { tool: String, permission: String },
    #[error("command execution requires approval and was not granted")]
    ApprovalDenied,
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    ReadFile(#[from] crate::tools::builtin::read_file::ReadFileError),
    #[error(transparent)]
    PathSafety(#[from] crate::tools::path_safety::PathSafetyError),
    #[error(transparent)]
    Mcp(#[from] McpCallError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub output: String,
    pub duration: Duration,
    pub is_error: bool,
}

/// Signals the agent runtime to halt the loop and surface pending questions.
pub struct AskUserPending {
    pub questions: Vec<String>,
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    workspace_root: PathBuf,
    approval_callback: Option<Arc<dyn ApprovalCallback>>,
    mcp: Option<Arc<McpRegistry>>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, workspace_root: PathBuf) -> Self {
        Self {
            registry,
            workspace_root,
            approval_callback: None,
            mcp: None,
        }
    }

    pub fn with_approval_callback(mut self, callback: Arc<dyn ApprovalCallback>) -> Self {
        self.approval_callback = Some(callback);
        self
    }

    pub fn with_mcp(mut self, mcp: Arc<McpRegistry>) -> Self {
        self.mcp = Some(mcp);
        self
    }

    pub async fn execute(
        &self,
        call: &ToolCall,
        caller_permissions: &HashSet<String>,
    ) -> Result<ToolResult, ToolError> {
        let started = Instant::now();
        let output = self.dispatch(call, caller_permissions).await?;
        Ok(ToolResult {
            call_id: call.id.clone(),
            output,
            duration: started.elapsed(),
            is_error: false,
        })
    }

    /// Runs tool calls concurrently and returns results keyed by call id,
    /// preserving per-call duration (§4.3).
    pub async fn execute_parallel(
        &self,
        calls: &[ToolCall],
        caller_permissions: &HashSet<String>,
    ) -> HashMap<String, ToolResult> {
        let futures = calls.iter().map(|call| async move {
            let started = Instant::now();
            match self.dispatch(call, caller_permissions).await {
                Ok(output) => (
                    call.id.clone(),
                    ToolResult {
                        call_id: call.id.clone(),
                        output,
                        duration: started.elapsed(),
                        is_error: false,
                    },
                ),
                Err(e) => (
                    call.id.clone(),
                    ToolResult {
                        call_id: call.id.clone(),
                        output: e.to_string(),
                        duration: started.elapsed(),
                        is_error: true,
                    },
                ),
            }
        });
        join_all(futures).await.into_iter().collect()
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        caller_permissions: &HashSet<String>,
    ) -> Result<String, ToolError> {
        let tools = self.registry.tools_for(caller_permissions).await;
        let definition = tools
            .iter()
            .find(|t| t.name == call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        for permission in &definition.required_permissions {
            if !caller_permissions.contains(permission) {
                return Err(ToolError::MissingPermission {
                    tool: call.name.clone(),
                    permission: permission.clone(),
                });
            }
        }

        match call.name.as_str() {
            "read_file" => {
                let path = str_arg(&call.arguments, "path")?;
                let start_line = u64_arg(&call.arguments, "start_line").map(|v| v as usize);
                let end_line = u64_arg(&call.arguments, "end_line").map(|v| v as usize);
                Ok(read_file::read_file(&self.workspace_root, &path, start_line, end_line).await?)
            }
            "search_text" => {
                let query = str_arg(&call.arguments, "query")?;
                let is_regex = call
                    .arguments
                    .get("is_regex")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let include_pattern = call.arguments.get("include_pattern").and_then(Value::as_str);
                let matches = search_text::search_text(&self.workspace_root, &query, is_regex, include_pattern)
                    .await?;
                Ok(format_search_results(&matches))
            }
            "list_directory" => {
                let path = call.arguments.get("path").and_then(Value::as_str);
                let entries = list_directory::list_directory(&self.workspace_root, path).await?;
                Ok(format_directory_listing(&entries))
            }
            "get_file_tree" => {
                let path = call.arguments.get("path").and_then(Value::as_str);
                let max_depth = u64_arg(&call.arguments, "max_depth").map(|v| v as usize);
                Ok(get_file_tree::get_file_tree(&self.workspace_root, path, max_depth).await?)
            }
            "ask_user" => {
                let questions: Vec<String> = call
                    .arguments
                    .get("questions")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                Ok(ask_user::ask_user(&questions))
            }
            "run_command" => {
                let command = str_arg(&call.arguments, "command")?;
                self.run_command_gated(&command, caller_permissions).await
            }
            name if name.starts_with("mcp_") => {
                let Some(mcp) = &self.mcp else {
                    return Err(ToolError::UnknownTool(name.to_string()));
                };
                Ok(mcp.call(name, call.arguments.clone(), None, caller_permissions).await?)
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn run_command_gated(
        &self,
        command: &str,
        caller_permissions: &HashSet<String>,
    ) -> Result<String, ToolError> {
        let class = run_command::classify_command(command);
        if class == run_command::CommandClass::ReadOnly {
            let output = run_command::execute_command(&self.workspace_root, command).await?;
            return Ok(render_command_output(&output));
        }

        if !caller_permissions.contains("execute_command") {
            return Err(ToolError::MissingPermission {
                tool: "run_command".to_string(),
                permission: "execute_command".to_string(),
            });
        }

        let Some(callback) = &self.approval_callback else {
            // No approval function present: execute directly (documented
            // policy default; production deployments should always supply one).
            let output = run_command::execute_command(&self.workspace_root, command).await?;
            return Ok(render_command_output(&output));
        };

        let decision = callback.request_approval(command).await;
        if !decision.approved {
            return Err(ToolError::ApprovalDenied);
        }
        let output = run_command::execute_command(&self.workspace_root, command).await?;
        Ok(render_command_output(&output))
    }
}

fn render_command_output(output: &run_command::CommandOutput) -> String {
    let mut rendered = String::new();
    if !output.stdout.is_empty() {
        rendered.push_str(&output.stdout);
    }
    if !output.stderr.is_empty() {
        rendered.push_str("\n[stderr]\n");
        rendered.push_str(&output.stderr);
    }
    if let Some(code) = output.exit_code {
        if code != 0 {
            rendered.push_str(&format!("\n[exit code {code}]"));
        }
    }
    rendered
}

fn format_search_results(matches: &[search_text::SearchMatch]) -> String {
    if matches.is_empty() {
        return "No matches found.".to_string();
    }
    matches
        .iter()
        .map(|m| {
            let mut block = String::new();
            for line in &m.context_before {
                block.push_str(line);
                block.push('\n');
            }
            block.push_str(&format!("{}:{}: {}\n", m.path, m.line_number, m.line));
            for line in &m.context_after {
                block.push_str(line);
                block.push('\n');
            }
            block
        })
        .collect::<Vec<_>>()
        .join("---\n")
}

fn format_directory_listing(entries: &[list_directory::DirectoryEntry]) -> String {
    entries
        .iter()
        .map(|e| match &e.kind {
            list_directory::DirectoryEntryKind::Directory { sub_count } => {
                format!("{}/ ({sub_count} items)", e.name)
            }
            list_directory::DirectoryEntryKind::File { size_bytes } => {
                format!("{} ({size_bytes} bytes)", e.name)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn str_arg(args: &Value, key: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{key}'")))
}

fn u64_arg(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_scope_permits_structurally_similar_commands() {
        let scope = ApprovalScope::Rule;
        assert!(scope.permits("git push origin main", "git push origin feature-x"));
        assert!(!scope.permits("git push --force origin main", "git push origin main"));
    }

    #[test]
    fn once_scope_only_permits_exact_command() {
        let scope = ApprovalScope::Once;
        assert!(scope.permits("ls -la", "ls -la"));
        assert!(!scope.permits("ls -la", "ls -l"));
    }

    #[tokio::test]
    async fn execute_rejects_unknown_tool() {
        let registry = Arc::new(ToolRegistry::new());
        let dir = tempfile::tempdir().unwrap();
        let executor = ToolExecutor::new(registry, dir.path().to_path_buf());
        let call = ToolCall {
            id: "1".into(),
            name: "does_not_exist".into(),
            arguments: serde_json::json!({}),
        };
        let mut permissions = HashSet::new();
        permissions.insert("read_source".to_string());
        let result = executor.execute(&call, &permissions).await;
        assert!(matches!(result, Err(ToolError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn execute_rejects_missing_permission() {
        let registry = Arc::new(ToolRegistry::new());
        let dir = tempfile::tempdir().unwrap();
        let executor = ToolExecutor::new(registry, dir.path().to_path_buf());
        let call = ToolCall {
            id: "1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({"path": "a.txt"}),
        };
        let result = executor.execute(&call, &HashSet::new()).await;
        assert!(matches!(result, Err(ToolError::MissingPermission { .. })));
    }
}
