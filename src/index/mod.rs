// Persisted vector index
// A LanceDB table of embedded nodes plus a JSON manifest describing how it was built


pub mod vector_store;

pub use vector_store::{EmbeddedNode, VectorStore};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embeddings::{Embedder, Node};
use crate::loaders::Document;
use crate::{OpsError, Result};

pub const MANIFEST_FILE_NAME: &str = "index_manifest.json";
const EMBED_BATCH_NODES: usize = 64;

/// A retrieved node with its relevance
#[derive(Debug, Clone, PartialEq)]
pub struct NodeWithScore {
    pub node: Node,
    pub similarity_score: f32,
    pub distance: f32,
}

/// Describes a persisted index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub name: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub document_count: usize,
    pub node_count: usize,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    #[inline]
    pub fn path_in(persist_dir: &Path) -> PathBuf {
        persist_dir.join(MANIFEST_FILE_NAME)
    }

    /// Read the manifest from `persist_dir`, `None` when there is none
    #[inline]
    pub fn read(persist_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(persist_dir);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let manifest = serde_json::from_str(&content).map_err(|e| {
            OpsError::Index(format!("Invalid manifest {}: {}", path.display(), e))
        })?;
        Ok(Some(manifest))
    }

    #[inline]
    pub fn write(&self, persist_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| OpsError::Index(format!("Failed to serialize manifest: {}", e)))?;
        std::fs::write(Self::path_in(persist_dir), content)?;
        Ok(())
    }
}

/// Similarity-searchable store of embedded nodes
#[derive(Debug)]
pub struct VectorIndex {
    manifest: IndexManifest,
    store: VectorStore,
}

impl VectorIndex {
    /// Embed `nodes` and persist them under `persist_dir`, replacing any previous index there
    #[inline]
    pub async fn build(
        name: &str,
        documents: &[Document],
        nodes: Vec<Node>,
        embedder: Arc<dyn Embedder>,
        persist_dir: &Path,
    ) -> Result<Self> {
        if nodes.is_empty() {
            return Err(OpsError::Index(format!("No nodes to index for {}", name)));
        }

        info!(
            "Building index {} from {} documents ({} nodes) in {}",
            name,
            documents.len(),
            nodes.len(),
            persist_dir.display()
        );

        // Without a manifest a half-written index is never reused
        let manifest_path = IndexManifest::path_in(persist_dir);
        if manifest_path.exists() {
            std::fs::remove_file(&manifest_path)?;
        }

        let mut store = VectorStore::open(persist_dir).await?;
        store.clear().await?;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(nodes.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(name.to_string());

        let node_count = nodes.len();
        let mut pending = nodes;
        while !pending.is_empty() {
            let rest = pending.split_off(EMBED_BATCH_NODES.min(pending.len()));
            let batch = std::mem::replace(&mut pending, rest);

            let texts: Vec<String> = batch.iter().map(|n| n.text.clone()).collect();
            let embedder = Arc::clone(&embedder);
            let vectors = tokio::task::spawn_blocking(move || embedder.embed_texts(&texts))
                .await
                .map_err(|e| OpsError::Embedding(format!("Embedding task failed: {}", e)))?
                .map_err(|e| OpsError::Embedding(format!("{:#}", e)))?;

            if vectors.len() != batch.len() {
                return Err(OpsError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let records: Vec<EmbeddedNode> = batch
                .into_iter()
                .zip(vectors)
                .map(|(node, vector)| EmbeddedNode { node, vector })
                .collect();
            store.store_nodes(&records).await?;
            bar.inc(records.len() as u64);
        }
        bar.finish_and_clear();

        let manifest = IndexManifest {
            name: name.to_string(),
            embedding_model: embedder.model_name().to_string(),
            dimension: store.vector_dimension().unwrap_or_default(),
            document_count: documents.len(),
            node_count,
            built_at: Utc::now(),
        };
        manifest.write(persist_dir)?;

        info!(
            "Index {} built with {} nodes of dimension {}",
            name, manifest.node_count, manifest.dimension
        );
        Ok(Self { manifest, store })
    }

    /// Reopen a persisted index if it was built with `embedding_model`
    #[inline]
    pub async fn load(
        name: &str,
        persist_dir: &Path,
        embedding_model: &str,
    ) -> Result<Option<Self>> {
        let Some(manifest) = IndexManifest::read(persist_dir)? else {
            debug!("No manifest for index {} in {}", name, persist_dir.display());
            return Ok(None);
        };

        if manifest.embedding_model != embedding_model {
            warn!(
                "Index {} was built with {}, configured model is {}; rebuilding",
                name, manifest.embedding_model, embedding_model
            );
            return Ok(None);
        }

        let store = VectorStore::open(persist_dir).await?;
        if store.count_nodes().await? == 0 {
            warn!("Index {} in {} is empty; rebuilding", name, persist_dir.display());
            return Ok(None);
        }

        info!(
            "Loaded index {} ({} nodes) from {}",
            name,
            manifest.node_count,
            persist_dir.display()
        );
        Ok(Some(Self { manifest, store }))
    }

    /// Top `top_k` nodes nearest to `query_vector`
    #[inline]
    pub async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<NodeWithScore>> {
        self.store.search_similar(query_vector, top_k).await
    }

    #[inline]
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.manifest.node_count
    }

    #[inline]
    pub fn persist_dir(&self) -> &Path {
        self.store.path()
    }
}
