//! Window manager (C12, §4.5): fits the message history into whatever
//! budget remains after the system prompt, plan summary, and tool schemas,
//! then (optionally) auto-summarizes when usage runs hot.

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::capability::ModelCapability;
use crate::llm::tokenizer::{estimate_message_tokens, estimate_tokens, shrink_to_fraction};
use crate::llm::types::{Message, ToolDefinition};

/// Always-preserved tail length is `2 * MIN_RECENT_MESSAGES`. Set a bit
/// higher than the teacher's `DeepSeekBudget::max_recent_messages` (3)
/// since this window manager has no separate summary-injection budget of
/// its own to fall back on.
const MIN_RECENT_MESSAGES: usize = 4;
const PRESERVED_SHARE: f64 = 0.30;
const SAFETY_MARGIN_TOKENS: u32 = 200;
const MIN_RESERVED_OUTPUT_TOKENS: u32 = 400;
const RESERVED_OUTPUT_FRACTION: f64 = 0.05;
const SUMMARIZE_TRIGGER_FRACTION: f64 = 0.90;
const MIN_MESSAGES_TO_SUMMARIZE: usize = 4;
const SUMMARY_MAX_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMap {
    pub max_input: u32,
    pub system_tokens: u32,
    pub plan_tokens: u32,
    pub tools_tokens: u32,
    pub history_tokens: u32,
    pub total_used: u32,
    pub available: u32,
    pub kept_messages: usize,
    pub dropped_messages: usize,
}

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarization call failed: {0}")]
    Call(String),
}

/// Abstraction over "call the LLM to compress this text", so the window
/// manager doesn't depend directly on the client/driver stack.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError>;
}

pub struct WindowManager;

impl WindowManager {
    fn tool_schema_tokens(tool_schemas: &[ToolDefinition]) -> u32 {
        tool_schemas
            .iter()
            .map(|t| estimate_tokens(&t.name) + estimate_tokens(&t.description) + estimate_tokens(&t.parameters.to_string()))
            .sum()
    }

    /// Fit `messages` into the remaining budget after system prompt, plan
    /// summary, and tool schemas. Returns the kept messages plus usage
    /// accounting.
    pub fn manage(
        messages: &[Message],
        system_prompt: &str,
        capability: &ModelCapability,
        plan_summary: Option<&str>,
        tool_schemas: &[ToolDefinition],
    ) -> (Vec<Message>, UsageMap) {
        let max_input = capability.max_context_tokens;
        let reserved_output =
            ((capability.max_output_tokens as f64) * RESERVED_OUTPUT_FRACTION).ceil() as u32;
        let reserved_output = reserved_output.max(MIN_RESERVED_OUTPUT_TOKENS);

        let system_tokens = estimate_tokens(system_prompt);
        let plan_tokens = plan_summary.map(estimate_tokens).unwrap_or(0);
        let tools_tokens = Self::tool_schema_tokens(tool_schemas);

        let fixed_costs = system_tokens + plan_tokens + tools_tokens;
        let budget = max_input
            .saturating_sub(reserved_output)
            .saturating_sub(SAFETY_MARGIN_TOKENS)
            .saturating_sub(fixed_costs);

        let kept = Self::trim_messages(messages, budget);
        let history_tokens = estimate_message_tokens(kept.iter().map(|m| m.text()).collect::<Vec<_>>().iter().map(|s| s.as_str()));
        let total_used = system_tokens + plan_tokens + tools_tokens + history_tokens;

        let usage = UsageMap {
            max_input,
            system_tokens,
            plan_tokens,
            tools_tokens,
            history_tokens,
            total_used,
            available: max_input.saturating_sub(total_used),
            kept_messages: kept.len(),
            dropped_messages: messages.len() - kept.len(),
        };

        (kept, usage)
    }

    fn trim_messages(messages: &[Message], budget: u32) -> Vec<Message> {
        if messages.is_empty() {
            return Vec::new();
        }

        // 1. Preserve the last min(2*MIN_RECENT_MESSAGES, len) messages.
        let preserve_count = (2 * MIN_RECENT_MESSAGES).min(messages.len());
        let split_at = messages.len() - preserve_count;
        let mut preserved: Vec<Message> = messages[split_at..].to_vec();
        let older = &messages[..split_at];

        // 2. Shrink any preserved message whose content exceeds 30% of budget.
        for message in preserved.iter_mut() {
            let text = message.text();
            if estimate_tokens(&text) as f64 > budget as f64 * PRESERVED_SHARE {
                let shrunk = shrink_to_fraction(&text, budget, PRESERVED_SHARE);
                *message = message.with_text(shrunk);
            }
        }

        // 3. If the preserved tail still exceeds budget, keep only the last two.
        let preserved_tokens = estimate_message_tokens(preserved.iter().map(|m| m.text()).collect::<Vec<_>>().iter().map(|s| s.as_str()));
        if preserved_tokens > budget {
            let keep_from = preserved.len().saturating_sub(2);
            preserved = preserved[keep_from..].to_vec();
        }

        let mut remaining_budget = budget.saturating_sub(estimate_message_tokens(
            preserved.iter().map(|m| m.text()).collect::<Vec<_>>().iter().map(|s| s.as_str()),
        ));

        // 4. Greedily prepend older messages, newest to oldest, while they fit.
        let mut prefix: Vec<Message> = Vec::new();
        for message in older.iter().rev() {
            let tokens = estimate_tokens(&message.text()) + 4;
            if tokens <= remaining_budget {
                remaining_budget -= tokens;
                prefix.push(message.clone());
            } else {
                break;
            }
        }
        prefix.reverse();

        prefix.into_iter().chain(preserved).collect()
    }

    /// When usage exceeds 90% of `max_input`, summarize everything but the
    /// most recent messages and prepend a synthetic summary message.
    pub async fn maybe_summarize(
        messages: Vec<Message>,
        usage: &UsageMap,
        summarizer: &dyn Summarizer,
    ) -> Result<Vec<Message>, SummarizeError> {
        let ratio = usage.total_used as f64 / usage.max_input.max(1) as f64;
        if ratio < SUMMARIZE_TRIGGER_FRACTION || messages.len() < MIN_MESSAGES_TO_SUMMARIZE {
            return Ok(messages);
        }

        let split_at = messages.len() - MIN_MESSAGES_TO_SUMMARIZE;
        let (head, tail) = messages.split_at(split_at);
        if head.is_empty() {
            return Ok(messages);
        }

        let head_text: String = head
            .iter()
            .map(|m| format!("[{:?}] {}", m.role, m.text()))
            .collect::<Vec<_>>()
            .join("\n");

        let instruction = format!(
            "请用不超过{}个中文字符总结以下对话历史，聚焦于已做出的决策、涉及的文件和尚未解决的问题：\n\n{}",
            SUMMARY_MAX_CHARS, head_text
        );

        let summary = summarizer.summarize(&instruction).await?;
        let summary_truncated: String = summary.chars().take(SUMMARY_MAX_CHARS).collect();

        let mut result = Vec::with_capacity(tail.len() + 1);
        result.push(Message::system(format!("[上下文摘要] {}", summary_truncated)));
        result.extend(tail.iter().cloned());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Role;

    fn capability(max_context: u32, max_output: u32) -> ModelCapability {
        ModelCapability {
            max_context_tokens: max_context,
            max_output_tokens: max_output,
            supports_tools: true,
            is_reasoning: false,
            auth_ok: true,
        }
    }

    fn msg(role: Role, text: &str) -> Message {
        match role {
            Role::User => Message::user(text),
            Role::Assistant => Message::assistant_text(text),
            Role::System => Message::system(text),
            Role::Tool => Message::tool_result("id", text),
        }
    }

    #[test]
    fn keeps_all_messages_when_budget_is_generous() {
        let messages: Vec<Message> = (0..6).map(|i| msg(Role::User, &format!("message {i}"))).collect();
        let (kept, usage) = WindowManager::manage(&messages, "system prompt", &capability(128_000, 4096), None, &[]);
        assert_eq!(kept.len(), 6);
        assert_eq!(usage.dropped_messages, 0);
    }

    #[test]
    fn drops_oldest_messages_under_tight_budget() {
        let messages: Vec<Message> = (0..20)
            .map(|i| msg(Role::User, &"x".repeat(200).to_string().replace("x", &format!("m{i}"))))
            .collect();
        let (kept, usage) = WindowManager::manage(&messages, "s", &capability(600, 100), None, &[]);
        assert!(kept.len() < messages.len());
        assert_eq!(usage.dropped_messages, messages.len() - kept.len());
        // The most recent message must always survive, even if shrunk.
        assert_eq!(kept.last().unwrap().role, messages.last().unwrap().role);
        assert!(!kept.is_empty());
    }

    #[tokio::test]
    async fn summarizes_when_usage_crosses_90_percent() {
        struct FixedSummarizer;
        #[async_trait]
        impl Summarizer for FixedSummarizer {
            async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
                Ok("已完成认证模块重构，涉及 auth.rs".to_string())
            }
        }

        let messages: Vec<Message> = (0..10).map(|i| msg(Role::User, &format!("turn {i}"))).collect();
        let usage = UsageMap {
            max_input: 1000,
            system_tokens: 0,
            plan_tokens: 0,
            tools_tokens: 0,
            history_tokens: 950,
            total_used: 950,
            available: 50,
            kept_messages: 10,
            dropped_messages: 0,
        };

        let result = WindowManager::maybe_summarize(messages, &usage, &FixedSummarizer).await.unwrap();
        assert!(matches!(result[0].role, Role::System));
        assert!(result[0].text().starts_with("[上下文摘要]"));
        assert_eq!(result.len(), MIN_MESSAGES_TO_SUMMARIZE + 1);
    }

    #[tokio::test]
    async fn skips_summarization_under_threshold() {
        struct PanicSummarizer;
        #[async_trait]
        impl Summarizer for PanicSummarizer {
            async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
                panic!("should not be called");
            }
        }

        let messages: Vec<Message> = (0..10).map(|i| msg(Role::User, &format!("turn {i}"))).collect();
        let usage = UsageMap {
            max_input: 1000,
            system_tokens: 0,
            plan_tokens: 0,
            tools_tokens: 0,
            history_tokens: 100,
            total_used: 100,
            available: 900,
            kept_messages: 10,
            dropped_messages: 0,
        };

        let result = WindowManager::maybe_summarize(messages.clone(), &usage, &PanicSummarizer).await.unwrap();
        assert_eq!(result.len(), messages.len());
    }
}
