// Retrieval-augmented query engine over a single vector index

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::embeddings::Embedder;
use crate::index::{NodeWithScore, VectorIndex};
use crate::llm::ChatModel;
use crate::{OpsError, Result};

pub const DEFAULT_SIMILARITY_TOP_K: usize = 2;
pub const EMPTY_RESPONSE: &str = "Empty Response";

/// Answer plus the nodes it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub response: String,
    pub source_nodes: Vec<NodeWithScore>,
}

impl fmt::Display for QueryResponse {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.response)
    }
}

pub struct QueryEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    similarity_top_k: usize,
}

impl fmt::Debug for QueryEngine {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("index", &self.index.name())
            .field("embedding_model", &self.embedder.model_name())
            .field("llm", &self.llm.model_name())
            .field("similarity_top_k", &self.similarity_top_k)
            .finish()
    }
}

impl QueryEngine {
    #[inline]
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            similarity_top_k: DEFAULT_SIMILARITY_TOP_K,
        }
    }

    #[inline]
    pub fn with_similarity_top_k(mut self, similarity_top_k: usize) -> Self {
        self.similarity_top_k = similarity_top_k;
        self
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Nodes most similar to `question`
    #[inline]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<NodeWithScore>> {
        if self.similarity_top_k == 0 {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let text = question.to_string();
        let query_vector = tokio::task::spawn_blocking(move || embedder.embed_query(&text))
            .await
            .map_err(|e| OpsError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| OpsError::Embedding(format!("{:#}", e)))?;

        let nodes = self.index.search(&query_vector, self.similarity_top_k).await?;
        debug!(
            "Retrieved {} nodes from {} for query",
            nodes.len(),
            self.index.name()
        );
        Ok(nodes)
    }

    /// Retrieve context for `question` and synthesize an answer from it
    #[inline]
    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        let source_nodes = self.retrieve(question).await?;

        if source_nodes.is_empty() {
            return Ok(QueryResponse {
                response: EMPTY_RESPONSE.to_string(),
                source_nodes,
            });
        }

        let prompt = build_context_prompt(question, &source_nodes);
        let llm = Arc::clone(&self.llm);
        let response = tokio::task::spawn_blocking(move || llm.complete(&prompt))
            .await
            .map_err(|e| OpsError::Llm(format!("Completion task failed: {}", e)))?
            .map_err(|e| OpsError::Llm(format!("{:#}", e)))?;

        Ok(QueryResponse {
            response: response.trim().to_string(),
            source_nodes,
        })
    }
}

/// Question-answering prompt with the retrieved nodes as context
#[inline]
pub fn build_context_prompt(question: &str, nodes: &[NodeWithScore]) -> String {
    let context = nodes
        .iter()
        .map(|n| format!("file_path: {}\n\n{}", n.node.file_path, n.node.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {question}\n\
         Answer: "
    )
}
