use super::*;
use crate::embeddings::{ChunkingConfig, Embedder, chunk_documents};
use crate::index::VectorIndex;
use crate::loaders::{Document, DocumentSource};
use crate::testing::{KeywordEmbedder, ScriptedChatModel};
use tempfile::TempDir;

#[test]
fn tool_names_and_descriptions_are_stable() {
    assert_eq!(ToolMetadata::code().name, "code_vector_tool");
    assert_eq!(
        ToolMetadata::code().description,
        "Vector Index for querying source code of java system"
    );
    assert_eq!(ToolMetadata::logs().name, "log_vector_tool");
    assert_eq!(
        ToolMetadata::logs().description,
        "Vector Index for querying log messages of java system"
    );
}

#[test]
fn definition_takes_single_input_string() {
    let definition = ToolMetadata::logs().to_definition();

    assert_eq!(definition.name, LOG_TOOL_NAME);
    assert_eq!(definition.parameters["type"], "object");
    assert_eq!(definition.parameters["properties"]["input"]["type"], "string");
    assert_eq!(definition.parameters["required"], json!(["input"]));
}

#[tokio::test]
async fn query_engine_tool_answers_with_sources() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let documents = vec![Document::new(
        "src/main/java/demo/OrderService.java",
        "public class OrderService { void placeOrder(Order order) {} }".to_string(),
        DocumentSource::Github {
            owner: "DevYoungHulk".to_string(),
            repo: "spring-demo".to_string(),
            branch: "main".to_string(),
        },
    )];
    let nodes = chunk_documents(&documents, &ChunkingConfig::default());
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new("fake"));
    let index = VectorIndex::build("code", &documents, nodes, Arc::clone(&embedder), temp_dir.path())
        .await
        .expect("index should build");

    let llm = Arc::new(ScriptedChatModel::new(vec![ScriptedChatModel::text(
        "placeOrder lives in OrderService",
    )]));
    let engine = QueryEngine::new(Arc::new(index), embedder, llm);
    let tool = QueryEngineTool::new(Arc::new(engine), ToolMetadata::code());

    let output = tool.call("where is an order placed?").await.expect("call should succeed");

    assert_eq!(tool.metadata().name, CODE_TOOL_NAME);
    assert_eq!(output.tool_name, CODE_TOOL_NAME);
    assert_eq!(output.raw_input, "where is an order placed?");
    assert_eq!(output.to_string(), "placeOrder lives in OrderService");
    assert_eq!(
        output.source_nodes[0].node.file_path,
        "src/main/java/demo/OrderService.java"
    );
}
