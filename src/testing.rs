//! Deterministic embedder and chat model doubles, plus a working-directory guard, for unit tests

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

use crate::embeddings::Embedder;
use crate::llm::{ChatMessage, ChatModel, ChatResponse, ToolCall, ToolDefinition};

pub const KEYWORDS: [&str; 3] = ["order", "payment", "user"];

/// Embeds text as keyword counts plus a constant bias, so related texts land close together
pub struct KeywordEmbedder {
    model: String,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|kw| lower.matches(kw).count() as f32)
                    .chain(std::iter::once(1.0))
                    .collect()
            })
            .collect())
    }
}

/// Replays canned responses and records every request it receives
#[derive(Default)]
pub struct ScriptedChatModel {
    responses: Mutex<VecDeque<ChatResponse>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    pub tool_names: Mutex<Vec<Vec<String>>>,
}

impl ScriptedChatModel {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: Some(content.to_string()),
            ..ChatResponse::default()
        }
    }

    pub fn call(id: &str, tool: &str, arguments: &str) -> ChatResponse {
        ChatResponse {
            tool_calls: vec![ToolCall::new(id, tool, arguments)],
            ..ChatResponse::default()
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("lock poisoned").len()
    }
}

impl ChatModel for ScriptedChatModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ChatResponse> {
        self.requests
            .lock()
            .expect("lock poisoned")
            .push(messages.to_vec());
        self.tool_names
            .lock()
            .expect("lock poisoned")
            .push(tools.iter().map(|t| t.name.clone()).collect());

        self.responses
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted response left"))
    }
}

/// Switches the process working directory, restoring the previous one on drop.
/// Tests using it must be `#[serial]`.
pub struct CurrentDirGuard {
    previous: PathBuf,
}

impl CurrentDirGuard {
    pub fn enter(dir: &Path) -> Self {
        let previous = std::env::current_dir().expect("should read current dir");
        std::env::set_current_dir(dir).expect("should change current dir");
        Self { previous }
    }
}

impl Drop for CurrentDirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.previous);
    }
}
