//! Agent runtime (C11, §4.6): the ReAct state machine that drives one turn —
//! stream from the LLM client, dispatch tool calls, detect fabrication, trim
//! tool output to the remaining context budget, and emit an ordered event
//! stream.
//!
//! Generalizes the teacher's `advisory/tool_loop.rs` (`ToolLoopProvider` +
//! `run_tool_loop`: a provider-generic round loop with a round cap and
//! logging, but only a handful of whitelisted read-only tools and no
//! fabrication detection) into the full state machine the design calls for.

pub mod dedup;
pub mod events;
pub mod fabrication;

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::dedup::DuplicateCallTracker;
use crate::agent::events::{AgentEvent, ReflectionAction, ToolCallInfo, ToolCallStart};
use crate::context::window::WindowManager;
use crate::llm::capability::ModelCapability;
use crate::llm::client::{ClientError, LlmClient};
use crate::llm::tokenizer::truncate_to_tokens;
use crate::llm::types::{FinishReason, Message, ModelId, ProviderEvent, ToolCall, ToolChoice, ToolDefinition};
use crate::tools::executor::ToolExecutor;
use crate::tools::registry::ToolRegistry;

const DEFAULT_MAX_TOOL_ROUNDS: u32 = 15;
/// Below this many tokens remaining, tool output is cut aggressively with a
/// warning marker rather than a hint to page through the file.
const AGGRESSIVE_TRIM_THRESHOLD_TOKENS: u32 = 500;

/// A source of streamed completions the runtime can drive a round loop
/// against. Generalizes the teacher's `ToolLoopProvider` seam so tests can
/// substitute a fake provider in place of a live `LlmClient`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn stream(
        &self,
        model: &ModelId,
        messages: Vec<Message>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        tools: Option<Vec<ToolDefinition>>,
        tool_choice: ToolChoice,
        request_id: String,
    ) -> Result<BoxStream<'static, ProviderEvent>, ClientError>;
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn stream(
        &self,
        model: &ModelId,
        messages: Vec<Message>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        tools: Option<Vec<ToolDefinition>>,
        tool_choice: ToolChoice,
        request_id: String,
    ) -> Result<BoxStream<'static, ProviderEvent>, ClientError> {
        LlmClient::stream(self, model, messages, temperature, max_tokens, tools, tool_choice, request_id).await
    }
}

/// Invoked every `reflection_interval` tool rounds; may tell the loop to
/// continue, adjust course, or abort outright.
#[async_trait]
pub trait Reflector: Send + Sync {
    async fn reflect(&self, messages: &[Message]) -> ReflectionOutcome;
}

#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    pub summary: String,
    pub action: ReflectionAction,
}

pub struct AgentRunInput {
    pub messages: Vec<Message>,
    pub model: ModelId,
    pub permissions: HashSet<String>,
    pub system_prompt: String,
    pub capability: ModelCapability,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub initial_plan: Option<Value>,
}

pub struct AgentRuntime {
    llm: std::sync::Arc<dyn CompletionProvider>,
    registry: std::sync::Arc<ToolRegistry>,
    executor: std::sync::Arc<ToolExecutor>,
    max_tool_rounds: u32,
    fabrication_detection_enabled: bool,
    reflection_interval: Option<u32>,
    reflector: Option<std::sync::Arc<dyn Reflector>>,
}

impl AgentRuntime {
    pub fn new(
        llm: std::sync::Arc<dyn CompletionProvider>,
        registry: std::sync::Arc<ToolRegistry>,
        executor: std::sync::Arc<ToolExecutor>,
    ) -> Self {
        Self {
            llm,
            registry,
            executor,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            fabrication_detection_enabled: true,
            reflection_interval: None,
            reflector: None,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_fabrication_detection(mut self, enabled: bool) -> Self {
        self.fabrication_detection_enabled = enabled;
        self
    }

    pub fn with_reflection(mut self, interval: u32, reflector: std::sync::Arc<dyn Reflector>) -> Self {
        self.reflection_interval = Some(interval);
        self.reflector = Some(reflector);
        self
    }

    /// Run one agent turn, returning an ordered stream of events per §6.
    pub fn run(self: std::sync::Arc<Self>, input: AgentRunInput) -> BoxStream<'static, AgentEvent> {
        async_stream::stream! {
            if let Some(plan) = input.initial_plan.clone() {
                yield AgentEvent::PlanUpdate { plan };
            }

            let tool_schemas = self.registry.tools_for(&input.permissions).await;
            let mut messages = input.messages;
            let mut round: u32 = 0;
            let mut fabrication_retries: u32 = 0;
            let mut dedup = DuplicateCallTracker::new();
            let mut force_tool_choice = ToolChoice::Auto;

            loop {
                let (managed_messages, _) = WindowManager::manage(&messages, &input.system_prompt, &input.capability, None, &tool_schemas);
                messages = managed_messages;

                let stream_result = self
                    .llm
                    .stream(
                        &input.model,
                        messages.clone(),
                        input.temperature,
                        input.max_tokens,
                        Some(tool_schemas.clone()),
                        force_tool_choice,
                        Uuid::new_v4().to_string(),
                    )
                    .await;

                let mut provider_stream = match stream_result {
                    Ok(s) => s,
                    Err(e) => {
                        yield AgentEvent::Error { error: e.to_string(), error_meta: None };
                        return;
                    }
                };

                let mut content = String::new();
                let mut tool_call_accum: BTreeMap<usize, ToolCallBuilder> = BTreeMap::new();
                let mut usage = None;
                let mut finish_reason = FinishReason::Stop;
                let mut saw_error = false;

                while let Some(event) = provider_stream.next().await {
                    match event {
                        ProviderEvent::ContentDelta(delta) => {
                            content.push_str(&delta);
                            yield AgentEvent::Content { content: delta };
                        }
                        ProviderEvent::ThinkingDelta(delta) => {
                            yield AgentEvent::Thinking { content: delta };
                        }
                        ProviderEvent::ToolCallDelta(delta) => {
                            let entry = tool_call_accum.entry(delta.index).or_default();
                            if let Some(id) = delta.id {
                                entry.id = Some(id);
                            }
                            if let Some(name) = delta.name {
                                entry.name = Some(name);
                            }
                            if let Some(fragment) = delta.arguments_delta {
                                entry.arguments.push_str(&fragment);
                            }
                            if !entry.start_emitted && entry.name.as_deref() == Some("ask_user") {
                                if let Some(id) = entry.id.clone() {
                                    entry.start_emitted = true;
                                    yield AgentEvent::ToolCallStart {
                                        tool_call: ToolCallStart { id, name: "ask_user".to_string() },
                                    };
                                }
                            }
                        }
                        ProviderEvent::Usage(u) => usage = Some(u),
                        ProviderEvent::Finish(f) => finish_reason = f,
                        ProviderEvent::Error(meta) => {
                            yield AgentEvent::Error { error: meta.message.clone(), error_meta: Some(meta) };
                            saw_error = true;
                        }
                    }
                }

                if saw_error {
                    return;
                }
                if let Some(usage) = usage {
                    yield AgentEvent::Usage { usage };
                }

                let mut tool_calls: Vec<ToolCall> = Vec::new();
                for (index, builder) in &tool_call_accum {
                    let Some(name) = builder.name.clone() else { continue };
                    let id = builder.id.clone().unwrap_or_else(|| format!("call_{index}"));
                    let arguments = serde_json::from_str::<Value>(&builder.arguments)
                        .unwrap_or_else(|_| serde_json::json!({ "_raw": builder.arguments }));
                    tool_calls.push(ToolCall { id, name, arguments });
                }

                if finish_reason == FinishReason::Length {
                    tool_calls.clear();
                    if !content.is_empty() {
                        yield AgentEvent::Truncated;
                    }
                }

                if tool_calls.is_empty() {
                    let should_retry = finish_reason != FinishReason::Length
                        && self.fabrication_detection_enabled
                        && !tool_schemas.is_empty()
                        && fabrication_retries < fabrication::max_retries()
                        && fabrication::looks_fabricated(&content);

                    if should_retry {
                        fabrication_retries += 1;
                        yield AgentEvent::Content { content: "检测到 AI 伪造执行结果".to_string() };
                        messages.push(Message::assistant_text(content.clone()));
                        messages.push(Message::user(
                            "你刚才的回复声称已经执行了操作，但没有实际调用任何工具。请使用提供的工具真正执行该操作，而不要凭空声称已完成。",
                        ));
                        force_tool_choice = ToolChoice::Required;
                        continue;
                    }
                    return;
                }

                round += 1;
                if round > self.max_tool_rounds {
                    yield AgentEvent::Content { content: format!("工具调用已达上限 ({}轮)", self.max_tool_rounds) };
                    return;
                }
                force_tool_choice = ToolChoice::Auto;

                messages.push(Message::assistant_tool_calls(tool_calls.clone()));

                let mut ask_user_requested = false;
                for call in &tool_calls {
                    yield AgentEvent::ToolCall {
                        tool_call: ToolCallInfo { id: call.id.clone(), name: call.name.clone(), arguments: call.arguments.clone() },
                    };

                    if call.name == "ask_user" {
                        ask_user_requested = true;
                    }

                    if dedup.check_and_record(call) {
                        let notice = DuplicateCallTracker::duplicate_notice();
                        messages.push(Message::tool_result(call.id.clone(), notice));
                        yield AgentEvent::ToolResult {
                            tool_call_id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result: notice.to_string(),
                            duration_ms: 0,
                        };
                        continue;
                    }

                    let started = Instant::now();
                    match self.executor.execute(call, &input.permissions).await {
                        Ok(result) => {
                            let (_, usage_map) = WindowManager::manage(&messages, &input.system_prompt, &input.capability, None, &tool_schemas);
                            let trimmed = trim_tool_result(&result.output, usage_map.available);
                            messages.push(Message::tool_result(call.id.clone(), trimmed.clone()));
                            yield AgentEvent::ToolResult {
                                tool_call_id: call.id.clone(),
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                                result: trimmed,
                                duration_ms: started.elapsed().as_millis() as u64,
                            };
                        }
                        Err(e) => {
                            messages.push(Message::tool_result(call.id.clone(), format!("error: {e}")));
                            yield AgentEvent::ToolError { tool_call_id: call.id.clone(), name: call.name.clone(), error: e.to_string() };
                        }
                    }
                }

                if ask_user_requested {
                    yield AgentEvent::AskUserPending;
                    return;
                }

                if let (Some(interval), Some(reflector)) = (self.reflection_interval, &self.reflector) {
                    if interval > 0 && round % interval == 0 {
                        let outcome = reflector.reflect(&messages).await;
                        let abort = outcome.action == ReflectionAction::Abort;
                        yield AgentEvent::Reflection { reflection: outcome.summary, action: outcome.action };
                        if abort {
                            return;
                        }
                    }
                }
            }
        }
        .boxed()
    }
}

#[derive(Default)]
struct ToolCallBuilder {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
    start_emitted: bool,
}

/// Trim a tool result to the remaining context budget per §4.6: below
/// [`AGGRESSIVE_TRIM_THRESHOLD_TOKENS`] an aggressive cut plus warning
/// marker; above it, a lighter cut with a hint to page via
/// `start_line`/`end_line`.
fn trim_tool_result(output: &str, remaining_budget: u32) -> String {
    use crate::llm::tokenizer::estimate_tokens;

    if estimate_tokens(output) <= remaining_budget {
        return output.to_string();
    }

    if remaining_budget <= AGGRESSIVE_TRIM_THRESHOLD_TOKENS {
        let cut = truncate_to_tokens(output, remaining_budget.saturating_sub(20).max(10));
        format!("{cut}\n\n[警告：剩余上下文空间不足，结果已大幅截断]")
    } else {
        let cut = truncate_to_tokens(output, remaining_budget.saturating_sub(30).max(50));
        format!("{cut}\n\n[结果已截断，可使用 start_line/end_line 参数分段读取]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_is_noop_when_under_budget() {
        let out = trim_tool_result("short output", 1000);
        assert_eq!(out, "short output");
    }

    #[test]
    fn trim_adds_aggressive_warning_under_low_budget() {
        let long_text = "line of text ".repeat(500);
        let out = trim_tool_result(&long_text, 100);
        assert!(out.contains("警告"));
    }

    #[test]
    fn trim_adds_pagination_hint_above_low_budget() {
        let long_text = "line of text ".repeat(2000);
        let out = trim_tool_result(&long_text, 2000);
        assert!(out.contains("start_line/end_line"));
    }
}
