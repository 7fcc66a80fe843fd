
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{ChatMessage, ChatModel, ChatResponse, TokenCounter, ToolCall, ToolDefinition, Usage};
use crate::config::LlmConfig;
use crate::http::{RetryPolicy, agent_with_timeout, send_with_retry};

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiClient {
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    agent: ureq::Agent,
    retry: RetryPolicy,
    token_counter: Option<Arc<TokenCounter>>,
}

impl std::fmt::Debug for OpenAiClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool<'a>>,
}

#[derive(Serialize)]
struct OpenAiTool<'a> {
    r#type: &'a str,
    function: OpenAiFunction<'a>,
}

#[derive(Serialize)]
struct OpenAiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl OpenAiClient {
    /// Build a client for the synthesis model, reading the key from `config.api_key_env`
    #[inline]
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .with_context(|| {
                format!(
                    "Environment variable {} must hold an API key for {}",
                    config.api_key_env, config.base_url
                )
            })?;

        Self::with_api_key(config, api_key)
    }

    #[inline]
    pub fn with_api_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        let endpoint = config
            .chat_completions_url()
            .context("Failed to build chat completions URL")?;

        Ok(Self {
            endpoint,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            agent: agent_with_timeout(Duration::from_secs(config.timeout_secs)),
            retry: RetryPolicy::default(),
            token_counter: None,
        })
    }

    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn with_token_counter(mut self, counter: Arc<TokenCounter>) -> Self {
        self.token_counter = Some(counter);
        self
    }
}

impl ChatModel for OpenAiClient {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ChatResponse> {
        let api_tools: Vec<OpenAiTool> = tools
            .iter()
            .map(|t| OpenAiTool {
                r#type: "function",
                function: OpenAiFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: api_tools,
        };
        let body_json = serde_json::to_string(&body).context("Failed to serialize chat request")?;

        debug!(
            "Sending {} messages with {} tools to {}",
            messages.len(),
            tools.len(),
            self.model
        );

        let authorization = format!("Bearer {}", self.api_key);
        let response_text = send_with_retry(self.endpoint.as_str(), self.retry, || {
            self.agent
                .post(self.endpoint.as_str())
                .header("Authorization", &authorization)
                .header("Content-Type", "application/json")
                .send(&body_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Chat completion request to {} failed", self.model))?;

        let response: ChatCompletionResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        let usage = response.usage.unwrap_or_default();
        if let Some(counter) = &self.token_counter {
            counter.record_usage(usage);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Chat response from {} had no choices", self.model))?;

        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        let content = choice.message.content.filter(|c| !c.is_empty());
        if content.is_none() && tool_calls.is_empty() {
            warn!("Model {} returned neither content nor tool calls", self.model);
        }

        Ok(ChatResponse {
            content,
            tool_calls,
            usage,
        })
    }
}
