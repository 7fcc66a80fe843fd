use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpsError>;

#[derive(Error, Debug)]
pub enum OpsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agent;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod http;
pub mod index;
pub mod llm;
pub mod loaders;
pub mod pipeline;
pub mod query;
pub mod repl;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;
