//! MCP data model (§4.4, §3 `MCPServerConfig`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Stdio,
    Sse,
    StreamableHttp,
}

/// A discovered MCP tool schema, prior to studio-name translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Persistent configuration for one MCP server. Invariant: exactly one of
/// `command`+`args` (stdio) or `url` (sse/streamable_http) is operative,
/// matching `transport`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub slug: String,
    pub name: String,
    pub transport: Transport,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env_template: HashMap<String, String>,
    pub url: Option<String>,
    pub enabled: bool,
    /// Maps a tool name to the permission key required to call it, beyond
    /// the blanket `mcp_<slug>` grant.
    pub permission_map: HashMap<String, String>,
    pub discovered_tools: Vec<ToolSchema>,
}

impl McpServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self.transport {
            Transport::Stdio => {
                if self.command.is_none() {
                    return Err(format!("server '{}': stdio transport requires `command`", self.slug));
                }
                if self.url.is_some() {
                    return Err(format!("server '{}': stdio transport must not set `url`", self.slug));
                }
            }
            Transport::Sse | Transport::StreamableHttp => {
                if self.url.is_none() {
                    return Err(format!("server '{}': {:?} transport requires `url`", self.slug, self.transport));
                }
                if self.command.is_some() {
                    return Err(format!("server '{}': {:?} transport must not set `command`", self.slug, self.transport));
                }
            }
        }
        Ok(())
    }
}

/// One audit record per MCP call (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpAuditRecord {
    pub server_slug: String,
    pub tool_name: String,
    pub arguments: Value,
    pub result_preview: String,
    pub duration_ms: i64,
    pub success: bool,
    pub project_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Resolution scope for a credential row, used by the secret resolver's
/// precedence chain.
#[derive(Debug, Clone)]
pub struct WorkspaceCredentials {
    pub workspace_id: String,
    pub values: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_without_command_is_invalid() {
        let cfg = McpServerConfig {
            slug: "github".into(),
            name: "GitHub".into(),
            transport: Transport::Stdio,
            command: None,
            args: vec![],
            env_template: HashMap::new(),
            url: None,
            enabled: true,
            permission_map: HashMap::new(),
            discovered_tools: vec![],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn http_with_command_is_invalid() {
        let cfg = McpServerConfig {
            slug: "remote".into(),
            name: "Remote".into(),
            transport: Transport::StreamableHttp,
            command: Some("node".into()),
            args: vec![],
            env_template: HashMap::new(),
            url: Some("https://example.com".into()),
            enabled: true,
            permission_map: HashMap::new(),
            discovered_tools: vec![],
        };
        assert!(cfg.validate().is_err());
    }
}
