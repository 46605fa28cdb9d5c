//! Built-in GitHub REST shim (§4.4), used as a transparent fallback when
//! the `github` MCP server is unavailable or errors for a small set of
//! tools.

use serde_json::Value;
use thiserror::Error;

const GITHUB_API_BASE: &str = "https://api.github.com";
pub const FALLBACK_MARKER: &str = "[via GitHub REST fallback]";

pub const SUPPORTED_TOOLS: &[&str] = &[
    "get_issue",
    "create_issue",
    "list_pull_requests",
    "get_pull_request",
    "merge_pull_request",
    "get_repo",
    "list_branches",
];

#[derive(Debug, Error)]
pub enum GithubFallbackError {
    #[error("tool '{0}' has no GitHub REST fallback")]
    UnsupportedTool(String),
    #[error("missing required argument '{0}'")]
    MissingArgument(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("GitHub API error ({status}): {body}")]
    Api { status: u16, body: String },
}

pub struct GithubFallback {
    client: reqwest::Client,
    token: String,
}

impl GithubFallback {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
        }
    }

    pub fn supports(tool_name: &str) -> bool {
        SUPPORTED_TOOLS.contains(&tool_name)
    }

    pub async fn call(&self, tool_name: &str, args: &Value) -> Result<String, GithubFallbackError> {
        let body = match tool_name {
            "get_issue" => {
                let (owner, repo) = owner_repo(args)?;
                let number = int_arg(args, "number")?;
                self.get(&format!("/repos/{owner}/{repo}/issues/{number}")).await?
            }
            "create_issue" => {
                let (owner, repo) = owner_repo(args)?;
                let title = str_arg(args, "title")?;
                let payload = serde_json::json!({
                    "title": title,
                    "body": args.get("body").and_then(Value::as_str).unwrap_or(""),
                });
                self.post(&format!("/repos/{owner}/{repo}/issues"), &payload).await?
            }
            "list_pull_requests" => {
                let (owner, repo) = owner_repo(args)?;
                self.get(&format!("/repos/{owner}/{repo}/pulls")).await?
            }
            "get_pull_request" => {
                let (owner, repo) = owner_repo(args)?;
                let number = int_arg(args, "number")?;
                self.get(&format!("/repos/{owner}/{repo}/pulls/{number}")).await?
            }
            "merge_pull_request" => {
                let (owner, repo) = owner_repo(args)?;
                let number = int_arg(args, "number")?;
                self.put(&format!("/repos/{owner}/{repo}/pulls/{number}/merge")).await?
            }
            "get_repo" => {
                let (owner, repo) = owner_repo(args)?;
                self.get(&format!("/repos/{owner}/{repo}")).await?
            }
            "list_branches" => {
                let (owner, repo) = owner_repo(args)?;
                self.get(&format!("/repos/{owner}/{repo}/branches")).await?
            }
            other => return Err(GithubFallbackError::UnsupportedTool(other.to_string())),
        };
        Ok(format!("{FALLBACK_MARKER}\n{body}"))
    }

    async fn get(&self, path: &str) -> Result<String, GithubFallbackError> {
        let response = self
            .client
            .get(format!("{GITHUB_API_BASE}{path}"))
            .bearer_auth(&self.token)
            .header("User-Agent", "forgemind")
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        Self::body_or_error(response).await
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<String, GithubFallbackError> {
        let response = self
            .client
            .post(format!("{GITHUB_API_BASE}{path}"))
            .bearer_auth(&self.token)
            .header("User-Agent", "forgemind")
            .header("Accept", "application/vnd.github+json")
            .json(payload)
            .send()
            .await?;
        Self::body_or_error(response).await
    }

    async fn put(&self, path: &str) -> Result<String, GithubFallbackError> {
        let response = self
            .client
            .put(format!("{GITHUB_API_BASE}{path}"))
            .bearer_auth(&self.token)
            .header("User-Agent", "forgemind")
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        Self::body_or_error(response).await
    }

    async fn body_or_error(response: reqwest::Response) -> Result<String, GithubFallbackError> {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GithubFallbackError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

fn owner_repo(args: &Value) -> Result<(String, String), GithubFallbackError> {
    let owner = str_arg(args, "owner")?;
    let repo = str_arg(args, "repo")?;
    Ok((owner, repo))
}

fn str_arg(args: &Value, key: &str) -> Result<String, GithubFallbackError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GithubFallbackError::MissingArgument(key.to_string()))
}

fn int_arg(args: &Value, key: &str) -> Result<u64, GithubFallbackError> {
    args.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| GithubFallbackError::MissingArgument(key.to_string()))
}
