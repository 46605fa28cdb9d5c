//! forgemind — CLI entry point for the execution core.
//!
//! Runs a single agent turn against the configured model and streams the
//! resulting events as JSON lines, one per `AgentEvent`. Follows the
//! teacher's `mira-chat/src/main.rs` wiring order: load `.env`, init
//! logging, parse CLI args, load the config file, merge, then bring up the
//! subsystems in dependency order.

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use futures::StreamExt;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

use forgemind_core::agent::{AgentRunInput, AgentRuntime};
use forgemind_core::config::{CliArgs, Config, FileConfig};
use forgemind_core::context::builder::ContextBuilder;
use forgemind_core::context::section::priority;
use forgemind_core::context::sources::{MemoryContextSource, RagContextSource, StaticSource, WorkspaceOverviewSource};
use forgemind_core::llm::client::{LlmClient, LlmClientConfig, ThirdPartyProviderConfig, ThirdPartyProviderStore};
use forgemind_core::llm::types::ModelId;
use forgemind_core::memory::MemoryStore;
use forgemind_core::rag::embedder::HashedTfEmbedder;
use forgemind_core::rag::index::VectorIndex;
use forgemind_core::skills::SkillEngine;
use forgemind_core::tools::executor::ToolExecutor;
use forgemind_core::tools::registry::ToolRegistry;

const ANTI_FABRICATION_PREAMBLE: &str = "Only claim to have run a command or edited a file after actually calling the corresponding tool. Never describe a tool result you did not receive.";
const ROLE_PERSONA: &str = "You are a careful, senior software engineering assistant working inside the user's own repository.";
const TOOL_STRATEGY: &str = "Prefer reading and searching before editing. Use the smallest set of tool calls that gets a correct answer, and never repeat a call you already made with the same arguments.";
/// Share of the model's context window set aside for the assembled system
/// prompt; the rest is left to `WindowManager` for message history.
const SYSTEM_PROMPT_BUDGET_FRACTION: f64 = 0.25;
const RAG_TOP_K: usize = 5;
const MEMORY_TOP_K: usize = 5;

struct NoThirdPartyProviders;

#[async_trait]
impl ThirdPartyProviderStore for NoThirdPartyProviders {
    async fn lookup(&self, _slug: &str) -> Option<ThirdPartyProviderConfig> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_path = dirs::home_dir().map(|h| h.join(".forgemind").join(".env")).filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = CliArgs::parse();
    let file_config = FileConfig::load();
    let config = Config::resolve(args, file_config);

    let workspace_root = config.workspace_root.clone();
    tracing::info!(workspace = %workspace_root.display(), model = %config.model, "starting forgemind");

    let db_url = if config.database_url.starts_with("sqlite:") {
        config.database_url.clone()
    } else {
        format!("sqlite:{}", config.database_url)
    };
    let db = SqlitePoolOptions::new().max_connections(5).connect(&db_url).await.ok();

    let memory: Option<Arc<MemoryStore>> = match &db {
        Some(pool) => {
            let memory = Arc::new(MemoryStore::new(pool.clone()));
            if let Err(e) = memory.migrate().await {
                tracing::warn!(error = %e, "memory store migration failed");
            }
            Some(memory)
        }
        None => {
            tracing::warn!(url = %db_url, "database unavailable, running without persistent memory");
            None
        }
    };

    let rag_index: Option<Arc<Mutex<VectorIndex>>> = match &db {
        Some(pool) => {
            let mut index = VectorIndex::new(pool.clone());
            if let Err(e) = index.migrate().await {
                tracing::warn!(error = %e, "rag index migration failed");
            }
            if let Err(e) = index.load().await {
                tracing::warn!(error = %e, "rag index load failed");
            }
            Some(Arc::new(Mutex::new(index)))
        }
        None => None,
    };

    let skills = match SkillEngine::load_dir(&workspace_root.join(".forgemind").join("skills")) {
        Ok(mut engine) => {
            for skill in engine.catalog().iter().map(|s| s.name.clone()).collect::<Vec<_>>() {
                engine.activate(&skill);
            }
            engine
        }
        Err(e) => {
            tracing::debug!(error = %e, "no skill directory found, running without skills");
            SkillEngine::new(Vec::new())
        }
    };

    let llm = Arc::new(LlmClient::new(LlmClientConfig {
        default_base_url: "https://api.openai.com/v1".to_string(),
        default_api_key: config.openai_api_key.clone().unwrap_or_default(),
        copilot_token_source: None,
        third_party_store: Arc::new(NoThirdPartyProviders),
    }));

    let registry = Arc::new(ToolRegistry::new());
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), workspace_root.clone()));
    let runtime = Arc::new(AgentRuntime::new(Arc::clone(&llm), Arc::clone(&registry), Arc::clone(&executor)).with_max_tool_rounds(config.max_tool_rounds));

    if config.openai_api_key.is_none() && config.anthropic_api_key.is_none() && config.deepseek_api_key.is_none() {
        tracing::warn!("no provider API key configured; requests to the default driver will fail authentication");
    }
    let prompt = read_prompt(&config.prompt)?;
    let model = ModelId(config.model.clone());
    let capability = llm.capability_cache.get(&model).await;

    let permissions: HashSet<String> = ["read_source", "search", "tree", "ask_user", "execute_readonly_command"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let project_basics = format!("Workspace root: {}\nModel: {}", workspace_root.display(), config.model);

    let mut context_builder = ContextBuilder::new()
        .with_source(Box::new(StaticSource::new("anti_fabrication", ANTI_FABRICATION_PREAMBLE, priority::ANTI_FABRICATION)))
        .with_source(Box::new(StaticSource::new("role_persona", ROLE_PERSONA, priority::ROLE_PERSONA)))
        .with_source(Box::new(StaticSource::new("project_basics", project_basics, priority::PROJECT_BASICS)))
        .with_source(Box::new(StaticSource::new("tool_strategy", TOOL_STRATEGY, priority::TOOL_STRATEGY)))
        .with_source(Box::new(WorkspaceOverviewSource::new(workspace_root.clone())))
        .with_source(Box::new(skills));

    if let Some(index) = &rag_index {
        context_builder = context_builder.with_source(Box::new(RagContextSource::new(
            Arc::clone(index),
            Arc::new(HashedTfEmbedder::new()),
            prompt.clone(),
            RAG_TOP_K,
        )));
    }
    if let Some(memory) = &memory {
        context_builder = context_builder.with_source(Box::new(MemoryContextSource::new(
            Arc::clone(memory),
            prompt.clone(),
            None,
            MEMORY_TOP_K,
        )));
    }

    let system_prompt_budget = ((capability.max_context_tokens as f64) * SYSTEM_PROMPT_BUDGET_FRACTION) as u32;
    let system_prompt = context_builder.build(system_prompt_budget, false).await.prompt;

    let input = AgentRunInput {
        messages: vec![forgemind_core::llm::types::Message::user(prompt)],
        model,
        permissions,
        system_prompt,
        capability,
        temperature: None,
        max_tokens: None,
        initial_plan: None,
    };

    let mut events = runtime.run(input);
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    Ok(())
}

/// The turn to run, taken from trailing CLI args or, if none were given,
/// read whole from stdin.
fn read_prompt(prompt_args: &[String]) -> anyhow::Result<String> {
    if !prompt_args.is_empty() {
        return Ok(prompt_args.join(" "));
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf.trim().to_string())
}
