//! Per-server MCP connections (§4.4), built on `rmcp`'s client/stdio
//! transport rather than a hand-rolled JSON-RPC framer.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{CallToolRequestParam, ClientInfo, Implementation};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::{serve_client, RoleClient};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::mcp::types::{McpServerConfig, ToolSchema, Transport};

const STARTUP_GRACE: Duration = Duration::from_millis(200);
const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum McpError {
    #[error("server '{0}' is not connected")]
    NotConnected(String),
    #[error("server '{0}' exited during startup: {1}")]
    ExitedOnStartup(String, String),
    #[error("failed to spawn server '{0}': {1}")]
    SpawnFailed(String, String),
    #[error("transport error for server '{0}': {1}")]
    Transport(String, String),
    #[error("sse/streamable_http transport not yet implemented for server '{0}'")]
    UnsupportedTransport(String),
    #[error("tool call failed: {0}")]
    ToolCall(String),
}

struct ConnectedServer {
    peer: Peer<RoleClient>,
    tools: Vec<ToolSchema>,
    _service: RunningService<RoleClient, ClientInfo>,
}

/// Owns live MCP connections. Created on first use, kept warm, force
/// disconnected on config update.
pub struct McpConnectionManager {
    connections: RwLock<HashMap<String, ConnectedServer>>,
}

impl McpConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn is_connected(&self, slug: &str) -> bool {
        self.connections.read().await.contains_key(slug)
    }

    /// Connect to a server if not already connected; on success, returns
    /// the discovered tool schemas so the caller can publish them back to
    /// the registry.
    pub async fn ensure_connected(
        &self,
        config: &McpServerConfig,
        env: HashMap<String, String>,
    ) -> Result<Vec<ToolSchema>, McpError> {
        if let Some(existing) = self.connections.read().await.get(&config.slug) {
            return Ok(existing.tools.clone());
        }

        match config.transport {
            Transport::Stdio => self.connect_stdio(config, env).await,
            Transport::Sse | Transport::StreamableHttp => {
                Err(McpError::UnsupportedTransport(config.slug.clone()))
            }
        }
    }

    async fn connect_stdio(
        &self,
        config: &McpServerConfig,
        env: HashMap<String, String>,
    ) -> Result<Vec<ToolSchema>, McpError> {
        let command_str = config
            .command
            .clone()
            .ok_or_else(|| McpError::SpawnFailed(config.slug.clone(), "no command configured".into()))?;

        let mut cmd = Command::new(&command_str);
        cmd.args(&config.args);
        for (key, value) in &env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| McpError::SpawnFailed(config.slug.clone(), e.to_string()))?;

        // Give the child a moment to fail fast (missing binary, bad args)
        // before we commit to the handshake.
        tokio::time::sleep(STARTUP_GRACE).await;

        let client_info = ClientInfo {
            protocol_version: Default::default(),
            capabilities: Default::default(),
            client_info: Implementation {
                name: "forgemind".into(),
                title: Some("Forgemind Agent Core".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
        };

        let service = serve_client(client_info, transport)
            .await
            .map_err(|e| McpError::ExitedOnStartup(config.slug.clone(), e.to_string()))?;

        let peer = service.peer().clone();

        let tools = peer
            .list_all_tools()
            .await
            .map_err(|e| McpError::Transport(config.slug.clone(), e.to_string()))?;

        let schemas: Vec<ToolSchema> = tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name.to_string(),
                description: t.description.as_deref().unwrap_or("").to_string(),
                input_schema: serde_json::to_value(t.input_schema.as_ref())
                    .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}})),
            })
            .collect();

        info!(slug = %config.slug, tool_count = schemas.len(), "connected to MCP server");

        self.connections.write().await.insert(
            config.slug.clone(),
            ConnectedServer {
                peer,
                tools: schemas.clone(),
                _service: service,
            },
        );

        Ok(schemas)
    }

    pub async fn call_tool(
        &self,
        slug: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, McpError> {
        let connections = self.connections.read().await;
        let server = connections
            .get(slug)
            .ok_or_else(|| McpError::NotConnected(slug.to_string()))?;

        let args_map = match arguments {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        };

        let result = server
            .peer
            .call_tool(CallToolRequestParam {
                name: tool_name.to_string().into(),
                arguments: args_map,
            })
            .await
            .map_err(|e| McpError::ToolCall(e.to_string()))?;

        let text: String = result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.to_string()))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(if text.is_empty() { "(empty result)".to_string() } else { text })
    }

    pub async fn ping(&self, slug: &str) -> bool {
        let connections = self.connections.read().await;
        let Some(server) = connections.get(slug) else {
            return false;
        };
        timeout(PING_TIMEOUT, server.peer.list_all_tools()).await.is_ok()
    }

    pub async fn health_check(&self) -> HashMap<String, bool> {
        let slugs: Vec<String> = self.connections.read().await.keys().cloned().collect();
        let mut result = HashMap::new();
        for slug in slugs {
            let healthy = self.ping(&slug).await;
            result.insert(slug, healthy);
        }
        result
    }

    /// Force-disconnect a server, e.g. on configuration update.
    pub async fn disconnect(&self, slug: &str) {
        if self.connections.write().await.remove(slug).is_some() {
            warn!(slug, "disconnected MCP server");
        }
    }

    pub async fn shutdown(&self) {
        self.connections.write().await.clear();
    }
}

impl Default for McpConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedConnectionManager = Arc<McpConnectionManager>;
