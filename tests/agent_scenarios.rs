//! Crate-level integration tests (§8): drive a real `AgentRuntime` — real
//! `ToolRegistry`/`ToolExecutor` against a tempdir workspace, real
//! duplicate/fabrication/round-cap logic — against a `FakeProvider` standing
//! in for the network-backed `LlmClient`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;

use forgemind_core::agent::events::AgentEvent;
use forgemind_core::agent::{AgentRunInput, AgentRuntime, CompletionProvider};
use forgemind_core::llm::capability::ModelCapability;
use forgemind_core::llm::client::ClientError;
use forgemind_core::llm::types::{
    FinishReason, Message, ModelId, ProviderEvent, ToolCallDelta, ToolChoice, ToolDefinition, Usage,
};
use forgemind_core::tools::executor::ToolExecutor;
use forgemind_core::tools::registry::ToolRegistry;

/// Replays one queued batch of `ProviderEvent`s per `stream()` call, in
/// order. Panics if exhausted, so a test's event queue must exactly match
/// the number of LLM round-trips its scenario exercises.
struct FakeProvider {
    responses: Mutex<VecDeque<Vec<ProviderEvent>>>,
}

impl FakeProvider {
    fn new(responses: Vec<Vec<ProviderEvent>>) -> Self {
        Self { responses: Mutex::new(responses.into_iter().collect()) }
    }
}

#[async_trait]
impl CompletionProvider for FakeProvider {
    async fn stream(
        &self,
        _model: &ModelId,
        _messages: Vec<Message>,
        _temperature: Option<f32>,
        _max_tokens: Option<u32>,
        _tools: Option<Vec<ToolDefinition>>,
        _tool_choice: ToolChoice,
        _request_id: String,
    ) -> Result<BoxStream<'static, ProviderEvent>, ClientError> {
        let mut responses = self.responses.lock().await;
        let batch = responses.pop_front().expect("FakeProvider exhausted: test sent more LLM round-trips than it queued");
        Ok(stream::iter(batch).boxed())
    }
}

fn capability() -> ModelCapability {
    ModelCapability {
        max_context_tokens: 128_000,
        max_output_tokens: 4_096,
        supports_tools: true,
        is_reasoning: false,
        auth_ok: true,
    }
}

fn permissions(grants: &[&str]) -> HashSet<String> {
    grants.iter().map(|s| s.to_string()).collect()
}

fn run_input(permissions: HashSet<String>) -> AgentRunInput {
    AgentRunInput {
        messages: vec![Message::user("hi")],
        model: ModelId::new("gpt-4o"),
        permissions,
        system_prompt: "You are a careful assistant.".to_string(),
        capability: capability(),
        temperature: None,
        max_tokens: None,
        initial_plan: None,
    }
}

fn tool_call_delta(index: usize, id: &str, name: &str, arguments: &str) -> ProviderEvent {
    ProviderEvent::ToolCallDelta(ToolCallDelta {
        index,
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        arguments_delta: Some(arguments.to_string()),
    })
}

async fn collect_events(runtime: Arc<AgentRuntime>, input: AgentRunInput) -> Vec<AgentEvent> {
    runtime.run(input).collect().await
}

#[tokio::test]
async fn plain_answer_emits_content_and_stops() {
    let provider = Arc::new(FakeProvider::new(vec![vec![
        ProviderEvent::ContentDelta("Hello there.".to_string()),
        ProviderEvent::Usage(Usage { prompt_tokens: 10, completion_tokens: 3, total_tokens: 13, reasoning_tokens: None }),
        ProviderEvent::Finish(FinishReason::Stop),
    ]]));

    let registry = Arc::new(ToolRegistry::new());
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), dir.path().to_path_buf()));
    let runtime = Arc::new(AgentRuntime::new(provider, registry, executor));

    let events = collect_events(runtime, run_input(permissions(&["read_source"]))).await;

    assert!(events.iter().any(|e| matches!(e, AgentEvent::Content { content } if content == "Hello there.")));
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::ToolCall { .. })));
}

#[tokio::test]
async fn single_tool_call_is_dispatched_and_answer_follows() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hello from a.txt").unwrap();

    let provider = Arc::new(FakeProvider::new(vec![
        vec![
            tool_call_delta(0, "call_1", "read_file", r#"{"path":"a.txt"}"#),
            ProviderEvent::Finish(FinishReason::ToolCalls),
        ],
        vec![
            ProviderEvent::ContentDelta("The file says: hello from a.txt".to_string()),
            ProviderEvent::Finish(FinishReason::Stop),
        ],
    ]));

    let registry = Arc::new(ToolRegistry::new());
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), dir.path().to_path_buf()));
    let runtime = Arc::new(AgentRuntime::new(provider, registry, executor));

    let events = collect_events(runtime, run_input(permissions(&["read_source"]))).await;

    let tool_result = events.iter().find_map(|e| match e {
        AgentEvent::ToolResult { name, result, .. } if name == "read_file" => Some(result.clone()),
        _ => None,
    });
    assert_eq!(tool_result.as_deref(), Some("hello from a.txt"));
    assert!(events.iter().any(|e| matches!(e, AgentEvent::Content { content } if content.contains("hello from a.txt"))));
}

#[tokio::test]
async fn round_cap_emits_literal_chinese_notice_then_stops() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    std::fs::write(dir.path().join("b.txt"), "b").unwrap();

    let provider = Arc::new(FakeProvider::new(vec![
        vec![
            tool_call_delta(0, "call_1", "read_file", r#"{"path":"a.txt"}"#),
            ProviderEvent::Finish(FinishReason::ToolCalls),
        ],
        vec![
            tool_call_delta(0, "call_2", "read_file", r#"{"path":"b.txt"}"#),
            ProviderEvent::Finish(FinishReason::ToolCalls),
        ],
    ]));

    let registry = Arc::new(ToolRegistry::new());
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), dir.path().to_path_buf()));
    let runtime = Arc::new(AgentRuntime::new(provider, registry, executor).with_max_tool_rounds(1));

    let events = collect_events(runtime, run_input(permissions(&["read_source"]))).await;

    assert!(events.iter().any(|e| matches!(e, AgentEvent::Content { content } if content == "工具调用已达上限 (1轮)")));
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));
}

#[tokio::test]
async fn duplicate_tool_call_in_one_turn_is_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a content").unwrap();

    let provider = Arc::new(FakeProvider::new(vec![
        vec![
            tool_call_delta(0, "call_1", "read_file", r#"{"path":"a.txt"}"#),
            tool_call_delta(1, "call_2", "read_file", r#"{"path":"a.txt"}"#),
            ProviderEvent::Finish(FinishReason::ToolCalls),
        ],
        vec![ProviderEvent::ContentDelta("done".to_string()), ProviderEvent::Finish(FinishReason::Stop)],
    ]));

    let registry = Arc::new(ToolRegistry::new());
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), dir.path().to_path_buf()));
    let runtime = Arc::new(AgentRuntime::new(provider, registry, executor));

    let events = collect_events(runtime, run_input(permissions(&["read_source"]))).await;

    let results: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolResult { result, .. } => Some(result.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], "a content");
    assert_eq!(results[1], "你已经读取过该内容，请直接使用之前的结果，无需重复调用。");
}

#[tokio::test]
async fn fabricated_claim_triggers_notice_and_forced_retry() {
    let provider = Arc::new(FakeProvider::new(vec![
        vec![
            ProviderEvent::ContentDelta("好的，已执行删除操作，输出如下：文件已删除".to_string()),
            ProviderEvent::Finish(FinishReason::Stop),
        ],
        vec![ProviderEvent::ContentDelta("Understood, I will not claim that again.".to_string()), ProviderEvent::Finish(FinishReason::Stop)],
    ]));

    let registry = Arc::new(ToolRegistry::new());
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), dir.path().to_path_buf()));
    let runtime = Arc::new(AgentRuntime::new(provider, registry, executor));

    let events = collect_events(runtime, run_input(permissions(&["read_source"]))).await;

    assert!(events.iter().any(|e| matches!(e, AgentEvent::Content { content } if content == "检测到 AI 伪造执行结果")));
    assert!(events.iter().any(|e| matches!(e, AgentEvent::Content { content } if content.contains("not claim that again"))));
}

#[tokio::test]
async fn ask_user_tool_call_pauses_the_loop() {
    let provider = Arc::new(FakeProvider::new(vec![vec![
        tool_call_delta(0, "call_1", "ask_user", r#"{"questions":["Which branch should I target?"]}"#),
        ProviderEvent::Finish(FinishReason::ToolCalls),
    ]]));

    let registry = Arc::new(ToolRegistry::new());
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), dir.path().to_path_buf()));
    let runtime = Arc::new(AgentRuntime::new(provider, registry, executor));

    let events = collect_events(runtime, run_input(permissions(&["ask_user"]))).await;

    assert!(events.iter().any(|e| matches!(e, AgentEvent::ToolCallStart { tool_call } if tool_call.name == "ask_user")));
    assert!(events.iter().any(|e| matches!(e, AgentEvent::AskUserPending)));
    assert!(matches!(events.last(), Some(AgentEvent::AskUserPending)));
}
