// Agent tools
// Named wrappers that let the agent query a vector index in natural language

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::Result;
use crate::index::NodeWithScore;
use crate::llm::ToolDefinition;
use crate::query::QueryEngine;

pub const CODE_TOOL_NAME: &str = "code_vector_tool";
pub const CODE_TOOL_DESCRIPTION: &str = "Vector Index for querying source code of java system";
pub const LOG_TOOL_NAME: &str = "log_vector_tool";
pub const LOG_TOOL_DESCRIPTION: &str = "Vector Index for querying log messages of java system";

/// Name and description the model sees when choosing a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

impl ToolMetadata {
    #[inline]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    #[inline]
    pub fn code() -> Self {
        Self::new(CODE_TOOL_NAME, CODE_TOOL_DESCRIPTION)
    }

    #[inline]
    pub fn logs() -> Self {
        Self::new(LOG_TOOL_NAME, LOG_TOOL_DESCRIPTION)
    }

    /// Function definition taking a single required string `input`
    #[inline]
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Natural language question to run against the index"
                    }
                },
                "required": ["input"]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub tool_name: String,
    pub raw_input: String,
    pub content: String,
    pub source_nodes: Vec<NodeWithScore>,
}

impl fmt::Display for ToolOutput {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    async fn call(&self, input: &str) -> Result<ToolOutput>;
}

/// Tool answering questions through a [`QueryEngine`]
#[derive(Debug)]
pub struct QueryEngineTool {
    metadata: ToolMetadata,
    engine: Arc<QueryEngine>,
}

impl QueryEngineTool {
    #[inline]
    pub fn new(engine: Arc<QueryEngine>, metadata: ToolMetadata) -> Self {
        Self { metadata, engine }
    }

    #[inline]
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }
}

#[async_trait]
impl Tool for QueryEngineTool {
    #[inline]
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    #[inline]
    async fn call(&self, input: &str) -> Result<ToolOutput> {
        let response = self.engine.query(input).await?;
        Ok(ToolOutput {
            tool_name: self.metadata.name.clone(),
            raw_input: input.to_string(),
            content: response.response,
            source_nodes: response.source_nodes,
        })
    }
}
