//! MCP subsystem (§4.4): stdio (and spec'd sse/streamable_http) tool
//! servers, surfaced to the agent runtime through the same tool registry
//! as built-in tools.

pub mod audit;
pub mod connection;
pub mod github_fallback;
pub mod naming;
pub mod rate_limit;
pub mod registry;
pub mod secret_resolver;
pub mod types;
