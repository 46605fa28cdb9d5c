//! forgemind-core: provider-agnostic LLM gateway, ReAct agent loop,
//! tool/MCP subsystem, and context/RAG pipeline for an AI-assisted
//! software engineering studio.
//!
//! Non-goals: this crate does not persist messages (callers do), does not
//! authenticate users, does not render a UI, does not schedule cron jobs,
//! and does not implement MCP servers themselves — only the client side.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod observability;
pub mod rag;
pub mod skills;
pub mod tools;
pub mod vcs;
