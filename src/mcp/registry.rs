//! MCP registry (C6): persistent server configs, permission checks, and the
//! single high-level entry point (`call`) that wires together connection,
//! secret resolution, audit, rate limiting, naming, and GitHub fallback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use crate::llm::types::ToolDefinition;
use crate::mcp::audit::AuditLog;
use crate::mcp::connection::{McpConnectionManager, McpError};
use crate::mcp::github_fallback::GithubFallback;
use crate::mcp::naming::{parse_studio_tool_name, studio_tool_name};
use crate::mcp::rate_limit::RateLimiter;
use crate::mcp::secret_resolver::SecretResolver;
use crate::mcp::types::{McpAuditRecord, McpServerConfig};
use crate::tools::registry::McpToolSource;

const GITHUB_SLUG: &str = "github";

/// Loads/saves MCP server configuration, e.g. backed by a database table.
#[async_trait]
pub trait McpConfigStore: Send + Sync {
    async fn load_all(&self) -> Vec<McpServerConfig>;
    async fn save_discovered_tools(&self, slug: &str, tools: Vec<crate::mcp::types::ToolSchema>);
}

#[derive(Debug, Error)]
pub enum McpCallError {
    #[error("server '{0}' is not configured or disabled")]
    NotConfigured(String),
    #[error("tool '{0}' is not permitted for this caller")]
    NotPermitted(String),
    #[error("rate limit exceeded for server '{0}'")]
    RateLimited(String),
    #[error(transparent)]
    Connection(#[from] McpError),
}

pub struct McpRegistry {
    config_store: Arc<dyn McpConfigStore>,
    connections: Arc<McpConnectionManager>,
    secrets: Arc<SecretResolver>,
    audit: Arc<AuditLog>,
    rate_limiter: Arc<RateLimiter>,
    github_fallback: Option<Arc<GithubFallback>>,
    configs_cache: RwLock<Vec<McpServerConfig>>,
}

impl McpRegistry {
    pub fn new(
        config_store: Arc<dyn McpConfigStore>,
        connections: Arc<McpConnectionManager>,
        secrets: Arc<SecretResolver>,
        audit: Arc<AuditLog>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config_store,
            connections,
            secrets,
            audit,
            rate_limiter,
            github_fallback: None,
            configs_cache: RwLock::new(Vec::new()),
        }
    }

    pub fn with_github_fallback(mut self, fallback: Arc<GithubFallback>) -> Self {
        self.github_fallback = Some(fallback);
        self
    }

    pub async fn refresh(&self) {
        let configs = self.config_store.load_all().await;
        *self.configs_cache.write().await = configs;
    }

    async fn config_for(&self, slug: &str) -> Option<McpServerConfig> {
        self.configs_cache
            .read()
            .await
            .iter()
            .find(|c| c.slug == slug && c.enabled)
            .cloned()
    }

    /// A call is permitted iff `mcp_<slug>` is granted and (no explicit
    /// `permission_map` entry for the tool, or the mapped key is granted).
    fn is_permitted(config: &McpServerConfig, tool_name: &str, permissions: &HashSet<String>) -> bool {
        let blanket_key = format!("mcp_{}", config.slug);
        if !permissions.contains(&blanket_key) {
            return false;
        }
        match config.permission_map.get(tool_name) {
            Some(mapped_key) => permissions.contains(mapped_key),
            None => true,
        }
    }

    pub async fn call(
        &self,
        studio_tool_name_str: &str,
        arguments: serde_json::Value,
        project_id: Option<&str>,
        permissions: &HashSet<String>,
    ) -> Result<String, McpCallError> {
        let Some((slug, tool_name)) = parse_studio_tool_name(studio_tool_name_str) else {
            return Err(McpCallError::NotConfigured(studio_tool_name_str.to_string()));
        };

        let Some(config) = self.config_for(&slug).await else {
            return Err(McpCallError::NotConfigured(slug));
        };

        if !Self::is_permitted(&config, &tool_name, permissions) {
            return Err(McpCallError::NotPermitted(studio_tool_name_str.to_string()));
        }

        if !self.rate_limiter.check_and_record(&slug, project_id) {
            return Err(McpCallError::RateLimited(slug));
        }

        let started = Instant::now();
        let env = self.secrets.resolve(&config.env_template, project_id);

        let call_result = match self.connections.ensure_connected(&config, env).await {
            Ok(tools) => {
                self.config_store.save_discovered_tools(&slug, tools).await;
                self.connections.call_tool(&slug, &tool_name, arguments.clone()).await
            }
            Err(e) => Err(e),
        };

        let final_result = match call_result {
            Ok(output) => Ok(output),
            Err(primary_error) if slug == GITHUB_SLUG => {
                match &self.github_fallback {
                    Some(fallback) if GithubFallback::supports(&tool_name) => {
                        warn!(slug = %slug, tool = %tool_name, error = %primary_error, "falling back to GitHub REST shim");
                        fallback
                            .call(&tool_name, &arguments)
                            .await
                            .map_err(|e| McpError::ToolCall(e.to_string()))
                    }
                    _ => Err(primary_error),
                }
            }
            Err(e) => Err(e),
        };

        let duration_ms = started.elapsed().as_millis() as i64;
        let record = McpAuditRecord {
            server_slug: slug,
            tool_name,
            arguments,
            result_preview: final_result.as_ref().map(|s| s.clone()).unwrap_or_default(),
            duration_ms,
            success: final_result.is_ok(),
            project_id: project_id.map(str::to_string),
            error_message: final_result.as_ref().err().map(|e| e.to_string()),
            created_at: Utc::now(),
        };
        if let Err(e) = self.audit.record(&record).await {
            warn!(error = %e, "failed to persist MCP audit record");
        }

        Ok(final_result?)
    }

    pub async fn health_check(&self) -> std::collections::HashMap<String, bool> {
        self.connections.health_check().await
    }
}

#[async_trait]
impl McpToolSource for McpRegistry {
    async fn discovered_tools(&self, permissions: &HashSet<String>) -> Vec<ToolDefinition> {
        let configs = self.configs_cache.read().await;
        let mut defs = Vec::new();
        for config in configs.iter().filter(|c| c.enabled) {
            for tool in &config.discovered_tools {
                if !Self::is_permitted(config, &tool.name, permissions) {
                    continue;
                }
                defs.push(ToolDefinition {
                    name: studio_tool_name(&config.slug, &tool.name),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                    required_permissions: vec![format!("mcp_{}", config.slug)],
                });
            }
        }
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::types::{Transport, WorkspaceCredentials};
    use std::collections::HashMap;

    fn sample_config(permission_map: HashMap<String, String>) -> McpServerConfig {
        McpServerConfig {
            slug: "github".into(),
            name: "GitHub".into(),
            transport: Transport::Stdio,
            command: Some("mcp-github".into()),
            args: vec![],
            env_template: HashMap::new(),
            url: None,
            enabled: true,
            permission_map,
            discovered_tools: vec![],
        }
    }

    #[test]
    fn permission_check_requires_blanket_grant() {
        let config = sample_config(HashMap::new());
        let permissions = HashSet::new();
        assert!(!McpRegistry::is_permitted(&config, "get_issue", &permissions));
    }

    #[test]
    fn permission_check_passes_with_blanket_grant_and_no_map_entry() {
        let config = sample_config(HashMap::new());
        let mut permissions = HashSet::new();
        permissions.insert("mcp_github".to_string());
        assert!(McpRegistry::is_permitted(&config, "get_issue", &permissions));
    }

    #[test]
    fn permission_check_requires_mapped_key_when_present() {
        let mut map = HashMap::new();
        map.insert("merge_pull_request".to_string(), "mcp_github_merge".to_string());
        let config = sample_config(map);

        let mut permissions = HashSet::new();
        permissions.insert("mcp_github".to_string());
        assert!(!McpRegistry::is_permitted(&config, "merge_pull_request", &permissions));

        permissions.insert("mcp_github_merge".to_string());
        assert!(McpRegistry::is_permitted(&config, "merge_pull_request", &permissions));
    }

    #[test]
    fn unused_import_guard() {
        let _ = WorkspaceCredentials {
            workspace_id: "x".into(),
            values: HashMap::new(),
        };
    }
}
