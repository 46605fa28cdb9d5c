//! Studio tool naming for MCP tools (§4.4): `mcp_<slug>__<tool>`.

/// Build the studio-facing tool name for an MCP tool.
pub fn studio_tool_name(slug: &str, tool: &str) -> String {
    format!("mcp_{slug}__{tool}")
}

/// Reverse-parse a studio tool name into `(slug, tool)`. Splits on `__`
/// after the `mcp_` prefix; returns `None` for non-MCP tool names.
pub fn parse_studio_tool_name(name: &str) -> Option<(String, String)> {
    let rest = name.strip_prefix("mcp_")?;
    let (slug, tool) = rest.split_once("__")?;
    if slug.is_empty() || tool.is_empty() {
        return None;
    }
    Some((slug.to_string(), tool.to_string()))
}
