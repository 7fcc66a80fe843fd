//! Wiring from configuration to a ready-to-use agent:
//! loader → splitter → vector index → query engine → named tool → agent.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::agent::Agent;
use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient, chunk_documents};
use crate::index::VectorIndex;
use crate::llm::{ChatModel, OpenAiClient, TokenCounter};
use crate::loaders::{DirectoryLoader, Document, GithubRepositoryLoader};
use crate::query::QueryEngine;
use crate::tools::{QueryEngineTool, Tool, ToolMetadata};
use crate::{OpsError, Result};

pub const CODE_INDEX_NAME: &str = "code";
pub const LOG_INDEX_NAME: &str = "logs";

/// Models and settings shared by every index, engine and the agent
pub struct ServiceContext {
    pub config: Config,
    pub embedder: Arc<dyn Embedder>,
    /// Model synthesizing answers inside the query engines
    pub llm: Arc<dyn ChatModel>,
    /// Model driving tool selection
    pub agent_llm: Arc<dyn ChatModel>,
    pub token_counter: Arc<TokenCounter>,
}

impl std::fmt::Debug for ServiceContext {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("embedder", &self.embedder.model_name())
            .field("llm", &self.llm.model_name())
            .field("agent_llm", &self.agent_llm.model_name())
            .field("token_usage", &self.token_counter.snapshot())
            .finish_non_exhaustive()
    }
}

impl ServiceContext {
    #[inline]
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        agent_llm: Arc<dyn ChatModel>,
        token_counter: Arc<TokenCounter>,
    ) -> Self {
        Self {
            config,
            embedder,
            llm,
            agent_llm,
            token_counter,
        }
    }

    /// Ollama embeddings plus OpenAI-compatible chat models, all feeding one token counter
    #[inline]
    pub fn from_config(config: Config) -> Result<Self> {
        let token_counter = Arc::new(TokenCounter::default());

        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| OpsError::Config(format!("{:#}", e)))?
            .with_token_counter(Arc::clone(&token_counter));

        let llm = OpenAiClient::from_config(&config.llm)
            .map_err(|e| OpsError::Config(format!("{:#}", e)))?
            .with_token_counter(Arc::clone(&token_counter));
        let agent_llm = llm.clone().with_model(config.llm.agent_model());

        Ok(Self::new(
            config,
            Arc::new(embedder),
            Arc::new(llm),
            Arc::new(agent_llm),
            token_counter,
        ))
    }
}

fn loader_error(e: anyhow::Error) -> OpsError {
    OpsError::Loader(format!("{:#}", e))
}

/// Fetch the configured repository's matching sources
#[inline]
pub async fn load_code_documents(config: &Config) -> Result<Vec<Document>> {
    let loader = GithubRepositoryLoader::from_config(&config.github)
        .map_err(loader_error)?;

    loader
        .load_data(&config.github.branch)
        .await
        .map_err(loader_error)
}

/// Read the configured log directory
#[inline]
pub async fn load_log_documents(config: &Config) -> Result<Vec<Document>> {
    DirectoryLoader::from_config(&config.logs)
        .load_data()
        .await
        .map_err(loader_error)
}

/// Split and embed `documents` into a fresh index under `persist_dir`
#[inline]
pub async fn build_index(
    config: &Config,
    embedder: &Arc<dyn Embedder>,
    name: &str,
    documents: &[Document],
    persist_dir: &Path,
) -> Result<VectorIndex> {
    let nodes = chunk_documents(documents, &config.chunking);
    VectorIndex::build(name, documents, nodes, Arc::clone(embedder), persist_dir).await
}

/// Index over the repository sources, reused from the cache unless `rebuild`
#[inline]
pub async fn code_index(
    config: &Config,
    embedder: &Arc<dyn Embedder>,
    rebuild: bool,
) -> Result<VectorIndex> {
    let persist_dir = config.cache.code_dir.as_path();
    if !rebuild {
        if let Some(index) =
            VectorIndex::load(CODE_INDEX_NAME, persist_dir, embedder.model_name()).await?
        {
            return Ok(index);
        }
    }

    info!("Loading sources from {}", config.github.display_name());
    let documents = load_code_documents(config).await?;
    build_index(config, embedder, CODE_INDEX_NAME, &documents, persist_dir).await
}

/// Index over the log files, reused from the cache unless `rebuild`
#[inline]
pub async fn log_index(
    config: &Config,
    embedder: &Arc<dyn Embedder>,
    rebuild: bool,
) -> Result<VectorIndex> {
    let persist_dir = config.cache.logs_dir.as_path();
    if !rebuild {
        if let Some(index) =
            VectorIndex::load(LOG_INDEX_NAME, persist_dir, embedder.model_name()).await?
        {
            return Ok(index);
        }
    }

    info!("Loading logs from {}", config.logs.directory.display());
    let documents = load_log_documents(config).await?;
    build_index(config, embedder, LOG_INDEX_NAME, &documents, persist_dir).await
}

/// Wrap `index` in a query engine tool configured from `ctx`
#[inline]
pub fn index_tool(ctx: &ServiceContext, index: VectorIndex, metadata: ToolMetadata) -> QueryEngineTool {
    let engine = QueryEngine::new(
        Arc::new(index),
        Arc::clone(&ctx.embedder),
        Arc::clone(&ctx.llm),
    )
    .with_similarity_top_k(ctx.config.retrieval.similarity_top_k);

    QueryEngineTool::new(Arc::new(engine), metadata)
}

/// `code_vector_tool`: answers questions about the repository sources
#[inline]
pub async fn build_code_tool(ctx: &ServiceContext, rebuild: bool) -> Result<QueryEngineTool> {
    let index = code_index(&ctx.config, &ctx.embedder, rebuild).await?;
    info!("code nodes size -> {}", index.node_count());
    Ok(index_tool(ctx, index, ToolMetadata::code()))
}

/// `log_vector_tool`: answers questions about the log files
#[inline]
pub async fn build_log_tool(ctx: &ServiceContext, rebuild: bool) -> Result<QueryEngineTool> {
    let index = log_index(&ctx.config, &ctx.embedder, rebuild).await?;
    info!("log nodes size -> {}", index.node_count());
    Ok(index_tool(ctx, index, ToolMetadata::logs()))
}

/// Agent over both tools with the configured system prompt
#[inline]
pub async fn build_agent(ctx: &ServiceContext, rebuild: bool) -> Result<Agent> {
    let code_tool: Arc<dyn Tool> = Arc::new(build_code_tool(ctx, rebuild).await?);
    let log_tool: Arc<dyn Tool> = Arc::new(build_log_tool(ctx, rebuild).await?);

    Ok(agent_from_tools(ctx, vec![code_tool, log_tool]))
}

#[inline]
pub fn agent_from_tools(ctx: &ServiceContext, tools: Vec<Arc<dyn Tool>>) -> Agent {
    Agent::from_tools(
        tools,
        Arc::clone(&ctx.agent_llm),
        ctx.config.agent.system_prompt.as_str(),
    )
    .with_max_iterations(ctx.config.agent.max_iterations)
}
