
use super::NodeWithScore;
use crate::{OpsError, Result, embeddings::Node};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const TABLE_NAME: &str = "nodes";

/// A node paired with its embedding, ready to be written
#[derive(Debug, Clone)]
pub struct EmbeddedNode {
    pub node: Node,
    pub vector: Vec<f32>,
}

/// LanceDB table of embedded nodes living in a single persist directory
pub struct VectorStore {
    connection: Connection,
    path: PathBuf,
    table_name: String,
    vector_dimension: Option<usize>,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.path)
            .field("table_name", &self.table_name)
            .field("vector_dimension", &self.vector_dimension)
            .finish()
    }
}

impl VectorStore {
    /// Open (or create) the store under `path`.
    ///
    /// The table itself is only created on the first insert, once the
    /// vector dimension is known.
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        debug!("Opening LanceDB at path: {}", path.display());

        std::fs::create_dir_all(path).map_err(|e| {
            OpsError::Index(format!(
                "Failed to create vector store directory {}: {}",
                path.display(),
                e
            ))
        })?;

        // Relative paths would otherwise be read as `file://<host>/...`
        let path = std::path::absolute(path).map_err(|e| {
            OpsError::Index(format!("Failed to resolve {}: {}", path.display(), e))
        })?;
        let uri = Url::from_file_path(&path).map_err(|()| {
            OpsError::Index(format!("Invalid vector store path: {}", path.display()))
        })?;

        let connection = lancedb::connect(uri.as_str())
            .execute()
            .await
            .map_err(|e| OpsError::Index(format!("Failed to connect to LanceDB: {}", e)))?;

        let mut store = Self {
            connection,
            path,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: None,
        };

        if store.has_table().await? {
            match store.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    debug!("Detected existing vector dimension: {}", dim);
                    store.vector_dimension = Some(dim);
                }
                Err(e) => warn!("Could not detect vector dimension from existing table: {}", e),
            }
        }

        Ok(store)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn vector_dimension(&self) -> Option<usize> {
        self.vector_dimension
    }

    #[inline]
    pub async fn has_table(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| OpsError::Index(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| OpsError::Index(format!("Failed to open table: {}", e)))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| OpsError::Index(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(OpsError::Index(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("file_path", DataType::Utf8, false),
            Field::new("extension", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("token_count", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Append embedded nodes, recreating the table when the dimension changes
    #[inline]
    pub async fn store_nodes(&mut self, records: &[EmbeddedNode]) -> Result<()> {
        let Some(first) = records.first() else {
            debug!("No nodes to store");
            return Ok(());
        };

        let vector_dim = first.vector.len();
        if vector_dim == 0 {
            return Err(OpsError::Index("Cannot store empty vectors".to_string()));
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(OpsError::Index(format!(
                "Node {} has dimension {}, expected {}",
                bad.node.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        if self.vector_dimension != Some(vector_dim) || !self.has_table().await? {
            info!(
                "Vector dimension changed from {:?} to {}, recreating table",
                self.vector_dimension, vector_dim
            );
            self.recreate_table_with_dimension(vector_dim).await?;
            self.vector_dimension = Some(vector_dim);
        }

        let record_batch = Self::create_record_batch(records, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.open_table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| OpsError::Index(format!("Failed to insert nodes: {}", e)))?;

        debug!("Stored {} nodes in {}", records.len(), self.path.display());
        Ok(())
    }

    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<()> {
        self.drop_table_if_exists().await?;

        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| {
                OpsError::Index(format!("Failed to create table with new dimensions: {}", e))
            })?;

        Ok(())
    }

    fn create_record_batch(records: &[EmbeddedNode], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();
        let created_at = Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut file_paths = Vec::with_capacity(len);
        let mut extensions = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut token_counts = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);

        for record in records {
            ids.push(record.node.id.as_str());
            document_ids.push(record.node.document_id.as_str());
            file_paths.push(record.node.file_path.as_str());
            extensions.push(record.node.extension.as_str());
            contents.push(record.node.text.as_str());
            token_counts.push(u32::try_from(record.node.token_count).unwrap_or(u32::MAX));
            chunk_indices.push(u32::try_from(record.node.chunk_index).unwrap_or(u32::MAX));
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| OpsError::Index(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(StringArray::from(file_paths)),
            Arc::new(StringArray::from(extensions)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(token_counts)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(vec![created_at.as_str(); len])),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| OpsError::Index(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest neighbours of `query_vector`, best first
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<NodeWithScore>> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 || !self.has_table().await? {
            return Ok(Vec::new());
        }

        if let Some(dim) = self.vector_dimension {
            if dim != query_vector.len() {
                return Err(OpsError::Index(format!(
                    "Query vector has dimension {}, index expects {}",
                    query_vector.len(),
                    dim
                )));
            }
        }

        let mut results = self
            .open_table()
            .await?
            .vector_search(query_vector)
            .map_err(|e| OpsError::Index(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| OpsError::Index(format!("Failed to execute search: {}", e)))?;

        let mut nodes = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| OpsError::Index(format!("Failed to read result stream: {}", e)))?
        {
            nodes.extend(Self::parse_search_batch(&batch)?);
        }

        nodes.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!("Parsed {} search results", nodes.len());
        Ok(nodes)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| OpsError::Index(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| OpsError::Index(format!("Invalid {} column type", name)))
    }

    fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
        batch
            .column_by_name(name)
            .ok_or_else(|| OpsError::Index(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| OpsError::Index(format!("Invalid {} column type", name)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<NodeWithScore>> {
        let ids = Self::string_column(batch, "id")?;
        let document_ids = Self::string_column(batch, "document_id")?;
        let file_paths = Self::string_column(batch, "file_path")?;
        let extensions = Self::string_column(batch, "extension")?;
        let contents = Self::string_column(batch, "content")?;
        let token_counts = Self::u32_column(batch, "token_count")?;
        let chunk_indices = Self::u32_column(batch, "chunk_index")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let results = (0..batch.num_rows())
            .map(|row| {
                let distance = distances
                    .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

                NodeWithScore {
                    node: Node {
                        id: ids.value(row).to_string(),
                        document_id: document_ids.value(row).to_string(),
                        text: contents.value(row).to_string(),
                        file_path: file_paths.value(row).to_string(),
                        extension: extensions.value(row).to_string(),
                        chunk_index: chunk_indices.value(row) as usize,
                        token_count: token_counts.value(row) as usize,
                    },
                    // Higher is better
                    similarity_score: 1.0 - distance,
                    distance,
                }
            })
            .collect();

        Ok(results)
    }

    /// Number of stored nodes, zero when the table does not exist yet
    #[inline]
    pub async fn count_nodes(&self) -> Result<u64> {
        if !self.has_table().await? {
            return Ok(0);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| OpsError::Index(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Drop all stored nodes
    #[inline]
    pub async fn clear(&mut self) -> Result<()> {
        self.drop_table_if_exists().await?;
        self.vector_dimension = None;
        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.has_table().await? {
            info!("Dropping existing {} table", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| OpsError::Index(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}
