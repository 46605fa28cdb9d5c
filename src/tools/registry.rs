//! Tool registry (C5): built-in tool definitions plus a persistence-backed
//! custom tool list, permission-filtered, with MCP tools appended.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::types::ToolDefinition;
use crate::tools::builtin;

/// Supplies additional tool definitions loaded from persistence (custom
/// tools configured outside the built-in set).
#[async_trait]
pub trait PersistedToolSource: Send + Sync {
    async fn load(&self) -> Vec<ToolDefinition>;
}

/// Supplies MCP-routed tool definitions, appended after built-ins (§4.4).
/// Implemented by the MCP registry; kept as a trait here so this module has
/// no hard dependency on the MCP subsystem's internals.
#[async_trait]
pub trait McpToolSource: Send + Sync {
    async fn discovered_tools(&self, permissions: &HashSet<String>) -> Vec<ToolDefinition>;
}

pub struct ToolRegistry {
    persisted: Option<Arc<dyn PersistedToolSource>>,
    mcp: Option<Arc<dyn McpToolSource>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            persisted: None,
            mcp: None,
        }
    }

    pub fn with_persisted_source(mut self, source: Arc<dyn PersistedToolSource>) -> Self {
        self.persisted = Some(source);
        self
    }

    pub fn with_mcp_source(mut self, source: Arc<dyn McpToolSource>) -> Self {
        self.mcp = Some(source);
        self
    }

    /// Returns the full built-in + persisted tool list, unfiltered.
    async fn all_local_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = builtin::definitions();
        if let Some(persisted) = &self.persisted {
            defs.extend(persisted.load().await);
        }
        defs
    }

    /// Returns the subset of tools this caller may use: local tools whose
    /// `required_permissions ⊆ caller_permissions`, followed by MCP tools.
    pub async fn tools_for(&self, caller_permissions: &HashSet<String>) -> Vec<ToolDefinition> {
        let mut result: Vec<ToolDefinition> = self
            .all_local_definitions()
            .await
            .into_iter()
            .filter(|def| {
                def.required_permissions
                    .iter()
                    .all(|perm| caller_permissions.contains(perm))
            })
            .collect();

        if let Some(mcp) = &self.mcp {
            result.extend(mcp.discovered_tools(caller_permissions).await);
        }
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_tools_by_permission() {
        let registry = ToolRegistry::new();
        let mut permissions = HashSet::new();
        permissions.insert("read_source".to_string());

        let tools = registry.tools_for(&permissions).await;
        let names: HashSet<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains("read_file"));
        assert!(!names.contains("search_text"));
    }

    #[tokio::test]
    async fn empty_permissions_yield_no_tools() {
        let registry = ToolRegistry::new();
        let tools = registry.tools_for(&HashSet::new()).await;
        assert!(tools.is_empty());
    }
}
