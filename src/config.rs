//! Configuration (A3): a TOML file at `~/.forgemind/config.toml`,
//! environment variables (`.env` via `dotenvy`, falling back to process
//! env), and CLI flags, in increasing precedence. Follows the teacher's
//! `mira-chat/src/config.rs` + `main.rs`'s `clap::Parser` pattern.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tokio::sync::watch;

const DEFAULT_DATABASE_URL: &str = "sqlite://forgemind.db";
const DEFAULT_MAX_TOOL_ROUNDS: u32 = 15;

/// On-disk config file, every field optional so a missing or partial file
/// just falls through to env/CLI/defaults.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub database_url: Option<String>,
    pub workspace_root: Option<String>,
    pub max_tool_rounds: Option<u32>,
    pub reflection_interval: Option<u32>,
}

impl FileConfig {
    /// Loads `~/.forgemind/config.toml`. A missing file is not an error; a
    /// malformed one logs a warning and falls back to defaults rather than
    /// aborting startup.
    pub fn load() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read config file, using defaults");
                Self::default()
            }
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".forgemind").join("config.toml")
}

#[derive(Parser, Debug, Clone)]
#[command(name = "forgemind")]
#[command(about = "Provider-agnostic LLM gateway and ReAct agent core")]
pub struct CliArgs {
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "DEEPSEEK_API_KEY")]
    pub deepseek_api_key: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Project directory the agent runs against (defaults to cwd).
    #[arg(long, short = 'w', env = "FORGEMIND_WORKSPACE")]
    pub workspace_root: Option<String>,

    #[arg(long)]
    pub max_tool_rounds: Option<u32>,

    #[arg(long)]
    pub reflection_interval: Option<u32>,

    /// Model id to run the agent with.
    #[arg(long, default_value = "gpt-4o")]
    pub model: String,

    /// The user turn to run. Read from stdin if omitted.
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

/// Fully resolved, immutable configuration snapshot.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub database_url: String,
    pub workspace_root: PathBuf,
    pub max_tool_rounds: u32,
    pub reflection_interval: Option<u32>,
}

impl Config {
    /// Merges CLI args (clap already folded in env vars via its `env`
    /// attribute) over the file config, over hardcoded defaults.
    pub fn resolve(args: CliArgs, file: FileConfig) -> Self {
        Self {
            openai_api_key: args.openai_api_key.or(file.openai_api_key),
            anthropic_api_key: args.anthropic_api_key.or(file.anthropic_api_key),
            deepseek_api_key: args.deepseek_api_key.or(file.deepseek_api_key),
            gemini_api_key: args.gemini_api_key.or(file.gemini_api_key),
            database_url: args.database_url.or(file.database_url).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            workspace_root: args
                .workspace_root
                .or(file.workspace_root)
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default()),
            max_tool_rounds: args.max_tool_rounds.or(file.max_tool_rounds).unwrap_or(DEFAULT_MAX_TOOL_ROUNDS),
            reflection_interval: args.reflection_interval.or(file.reflection_interval),
        }
    }
}

/// Publishes an `Arc<Config>` snapshot that long-lived singletons (driver
/// cache, capability cache) observe; `reload()` swaps the snapshot without
/// restarting the process, per the "immutable snapshot + mutation API"
/// pattern.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<Config>>>,
    rx: watch::Receiver<Arc<Config>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        let (tx, rx) = watch::channel(Arc::new(config));
        Self { tx: Arc::new(tx), rx }
    }

    pub fn current(&self) -> Arc<Config> {
        self.rx.borrow().clone()
    }

    pub fn reload(&self, config: Config) {
        let _ = self.tx.send(Arc::new(config));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.rx.clone()
    }
}
