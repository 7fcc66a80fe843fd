// Embeddings module
// Node splitting and the Ollama embedding client

pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkingConfig, Node, chunk_document, chunk_documents, estimate_token_count};
pub use ollama::{ModelInfo, OllamaClient};

use anyhow::Result;

/// Anything that can turn text into vectors.
///
/// Calls are blocking; async callers should run them on `spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in index manifests
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, one vector per input in order
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single retrieval query
    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedder returned no vector for query"))
    }
}
