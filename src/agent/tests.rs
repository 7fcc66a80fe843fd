use super::*;
use crate::llm::Role;
use crate::testing::ScriptedChatModel;
use crate::tools::{LOG_TOOL_NAME, ToolMetadata};
use async_trait::async_trait;
use std::sync::Mutex;

/// Tool returning a canned answer and recording its inputs
struct CannedTool {
    metadata: ToolMetadata,
    answer: String,
    inputs: Mutex<Vec<String>>,
}

impl CannedTool {
    fn new(metadata: ToolMetadata, answer: &str) -> Arc<Self> {
        Arc::new(Self {
            metadata,
            answer: answer.to_string(),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn inputs(&self) -> Vec<String> {
        self.inputs.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Tool for CannedTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn call(&self, input: &str) -> Result<ToolOutput> {
        self.inputs
            .lock()
            .expect("lock poisoned")
            .push(input.to_string());
        Ok(ToolOutput {
            tool_name: self.metadata.name.clone(),
            raw_input: input.to_string(),
            content: self.answer.clone(),
            source_nodes: Vec::new(),
        })
    }
}

struct FailingTool(ToolMetadata);

#[async_trait]
impl Tool for FailingTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.0
    }

    async fn call(&self, _input: &str) -> Result<ToolOutput> {
        Err(OpsError::Index("table missing".to_string()))
    }
}

fn agent_with(llm: &Arc<ScriptedChatModel>, tools: Vec<Arc<dyn Tool>>) -> Agent {
    Agent::from_tools(tools, Arc::clone(llm) as Arc<dyn ChatModel>, "You are an ops bot.")
}

#[tokio::test]
async fn dispatches_tool_calls_and_feeds_results_back() {
    let logs = CannedTool::new(ToolMetadata::logs(), "NullPointerException in OrderService");
    let code = CannedTool::new(ToolMetadata::code(), "OrderService.placeOrder dereferences stock");
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedChatModel::call("call_1", "log_vector_tool", r#"{"input":"recent errors"}"#),
        ScriptedChatModel::call("call_2", "code_vector_tool", r#"{"input":"OrderService"}"#),
        ScriptedChatModel::text("Check the null stock in OrderService.placeOrder"),
    ]));
    let mut agent = agent_with(&llm, vec![logs.clone() as Arc<dyn Tool>, code.clone()]);

    let response = agent.chat("why do orders fail?").await.expect("turn should succeed");

    assert_eq!(response.response, "Check the null stock in OrderService.placeOrder");
    assert_eq!(response.sources.len(), 2);
    assert_eq!(logs.inputs(), vec!["recent errors"]);
    assert_eq!(code.inputs(), vec!["OrderService"]);

    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0][0].role, Role::System);
    assert_eq!(requests[0][0].content.as_deref(), Some("You are an ops bot."));

    let tool_message = &requests[1][3];
    assert_eq!(tool_message.role, Role::Tool);
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(
        tool_message.content.as_deref(),
        Some("NullPointerException in OrderService")
    );

    let tool_names = llm.tool_names.lock().expect("lock poisoned").clone();
    assert_eq!(tool_names[0], vec!["log_vector_tool", "code_vector_tool"]);
}

#[tokio::test]
async fn history_carries_previous_turns_until_reset() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedChatModel::text("first answer"),
        ScriptedChatModel::text("second answer"),
        ScriptedChatModel::text("third answer"),
    ]));
    let mut agent = agent_with(&llm, Vec::new());

    agent.chat("first question").await.expect("turn should succeed");
    assert_eq!(agent.history().len(), 2);

    agent.chat("second question").await.expect("turn should succeed");
    let requests = llm.requests();
    let second = &requests[1];
    assert_eq!(second.len(), 4);
    assert_eq!(second[1].content.as_deref(), Some("first question"));
    assert_eq!(second[2].content.as_deref(), Some("first answer"));

    agent.reset();
    assert!(agent.history().is_empty());

    agent.chat("third question").await.expect("turn should succeed");
    let requests = llm.requests();
    let third = &requests[2];
    assert_eq!(third.len(), 2);
    assert_eq!(third[0].role, Role::System);
    assert_eq!(third[1].content.as_deref(), Some("third question"));
}

#[tokio::test]
async fn unknown_tools_and_tool_failures_become_error_messages() {
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedChatModel::call("call_1", "missing_tool", r#"{"input":"x"}"#),
        ScriptedChatModel::call("call_2", LOG_TOOL_NAME, r#"{"input":"y"}"#),
        ScriptedChatModel::text("could not find anything"),
    ]));
    let failing: Arc<dyn Tool> = Arc::new(FailingTool(ToolMetadata::logs()));
    let mut agent = agent_with(&llm, vec![failing]);

    let response = agent.chat("help").await.expect("turn should succeed");
    assert_eq!(response.response, "could not find anything");
    assert!(response.sources.is_empty());

    let requests = llm.requests();
    let unknown = requests[1].last().and_then(|m| m.content.clone()).unwrap_or_default();
    assert!(unknown.starts_with("Error: "));
    assert!(unknown.contains("missing_tool"));

    let failed = requests[2].last().and_then(|m| m.content.clone()).unwrap_or_default();
    assert!(failed.starts_with("Error: "));
    assert!(failed.contains("table missing"));
}

#[tokio::test]
async fn max_iterations_is_an_error_and_history_is_untouched() {
    let logs = CannedTool::new(ToolMetadata::logs(), "more logs");
    let llm = Arc::new(ScriptedChatModel::new(vec![
        ScriptedChatModel::call("call_1", LOG_TOOL_NAME, r#"{"input":"a"}"#),
        ScriptedChatModel::call("call_2", LOG_TOOL_NAME, r#"{"input":"b"}"#),
    ]));
    let mut agent = agent_with(&llm, vec![logs as Arc<dyn Tool>]).with_max_iterations(2);

    let result = agent.chat("loop forever").await;

    assert!(matches!(result, Err(OpsError::Agent(_))));
    assert!(agent.history().is_empty());
}

#[tokio::test]
async fn llm_failure_propagates() {
    let llm = Arc::new(ScriptedChatModel::default());
    let mut agent = agent_with(&llm, Vec::new());

    assert!(matches!(agent.chat("hello").await, Err(OpsError::Llm(_))));
}

#[test]
fn tool_input_parsing() {
    assert_eq!(parse_tool_input(r#"{"input":"errors today"}"#), "errors today");
    assert_eq!(parse_tool_input(r#""bare string""#), "bare string");
    assert_eq!(parse_tool_input(r#"{"input": 42}"#), "42");
    assert_eq!(parse_tool_input(r#"{"query":"x"}"#), r#"{"query":"x"}"#);
    assert_eq!(parse_tool_input("not json"), "not json");
}
