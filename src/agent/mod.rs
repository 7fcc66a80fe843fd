//! Tool-calling agent.
//!
//! Each turn sends the system prompt, the conversation so far and the new user
//! message to the chat model along with the tool definitions. Tool calls are
//! dispatched by name and their results fed back until the model answers in
//! plain text.

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, ChatModel, ChatResponse, ToolCall, ToolDefinition};
use crate::tools::{Tool, ToolOutput};
use crate::{OpsError, Result};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub response: String,
    /// Outputs of every tool call made during the turn, in call order
    pub sources: Vec<ToolOutput>,
}

impl fmt::Display for AgentResponse {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.response)
    }
}

pub struct Agent {
    tools: Vec<Arc<dyn Tool>>,
    llm: Arc<dyn ChatModel>,
    system_prompt: String,
    history: Vec<ChatMessage>,
    max_iterations: usize,
}

impl fmt::Debug for Agent {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tool_names: Vec<&str> = self
            .tools
            .iter()
            .map(|t| t.metadata().name.as_str())
            .collect();
        f.debug_struct("Agent")
            .field("tools", &tool_names)
            .field("llm", &self.llm.model_name())
            .field("history_len", &self.history.len())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl Agent {
    #[inline]
    pub fn from_tools(
        tools: Vec<Arc<dyn Tool>>,
        llm: Arc<dyn ChatModel>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            tools,
            llm,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Messages of completed turns, without the system prompt
    #[inline]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    #[inline]
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Forget all previous turns
    #[inline]
    pub fn reset(&mut self) {
        debug!("Clearing {} history messages", self.history.len());
        self.history.clear();
    }

    /// Run one conversational turn.
    ///
    /// History is only updated when the turn completes.
    #[inline]
    pub async fn chat(&mut self, message: &str) -> Result<AgentResponse> {
        let definitions: Vec<ToolDefinition> = self
            .tools
            .iter()
            .map(|t| t.metadata().to_definition())
            .collect();

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        messages.extend(self.history.iter().cloned());
        let turn_start = messages.len();
        messages.push(ChatMessage::user(message));

        let mut sources = Vec::new();

        for iteration in 1..=self.max_iterations {
            debug!("Agent iteration {}/{}", iteration, self.max_iterations);

            let response = self.send(&messages, &definitions).await?;

            if response.has_tool_calls() {
                messages.push(ChatMessage::assistant_tool_calls(
                    response.content.clone(),
                    response.tool_calls.clone(),
                ));

                for tool_call in &response.tool_calls {
                    let result = match self.dispatch(tool_call).await {
                        Ok(output) => {
                            let content = output.content.clone();
                            sources.push(output);
                            content
                        }
                        Err(e) => {
                            warn!("Tool call {} failed: {}", tool_call.function.name, e);
                            format!("Error: {}", e)
                        }
                    };
                    messages.push(ChatMessage::tool_result(tool_call.id.as_str(), result));
                }
                continue;
            }

            let Some(content) = response.content else {
                return Err(OpsError::Agent(
                    "Model returned neither an answer nor tool calls".to_string(),
                ));
            };

            messages.push(ChatMessage::assistant(content.as_str()));
            self.history.extend(messages.drain(turn_start..));

            return Ok(AgentResponse {
                response: content,
                sources,
            });
        }

        Err(OpsError::Agent(format!(
            "Reached max iterations ({}) without a final answer",
            self.max_iterations
        )))
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        definitions: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let llm = Arc::clone(&self.llm);
        let messages = messages.to_vec();
        let definitions = definitions.to_vec();

        tokio::task::spawn_blocking(move || llm.chat(&messages, &definitions))
            .await
            .map_err(|e| OpsError::Llm(format!("Chat task failed: {}", e)))?
            .map_err(|e| OpsError::Llm(format!("{:#}", e)))
    }

    async fn dispatch(&self, tool_call: &ToolCall) -> Result<ToolOutput> {
        let name = tool_call.function.name.as_str();
        let tool = self
            .tools
            .iter()
            .find(|t| t.metadata().name == name)
            .ok_or_else(|| OpsError::Agent(format!("Tool {} not found", name)))?;

        let input = parse_tool_input(&tool_call.function.arguments);
        info!("Calling function {} with input: {}", name, input);

        let output = tool.call(&input).await?;
        debug!("Function {} returned {} bytes", name, output.content.len());
        Ok(output)
    }
}

/// Extract the `input` argument, falling back to the raw argument string
#[inline]
pub fn parse_tool_input(arguments: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(serde_json::Value::Object(map)) => match map.get("input") {
            Some(serde_json::Value::String(input)) => input.clone(),
            Some(other) => other.to_string(),
            None => arguments.to_string(),
        },
        Ok(serde_json::Value::String(input)) => input,
        _ => arguments.to_string(),
    }
}
