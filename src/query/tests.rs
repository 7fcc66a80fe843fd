use super::*;
use crate::embeddings::{ChunkingConfig, Node, chunk_documents};
use crate::llm::Role;
use crate::loaders::{Document, DocumentSource};
use crate::testing::{KeywordEmbedder, ScriptedChatModel};
use tempfile::TempDir;

async fn log_index(dir: &std::path::Path, embedder: Arc<dyn Embedder>) -> Arc<VectorIndex> {
    let source = DocumentSource::Directory {
        root: "data/log".to_string(),
    };
    let documents = vec![
        Document::new(
            "order.log",
            "ERROR OrderService order 42 failed: order stock below zero".to_string(),
            source.clone(),
        ),
        Document::new(
            "payment.log",
            "WARN PaymentService payment declined".to_string(),
            source.clone(),
        ),
        Document::new("user.log", "INFO user alice logged in".to_string(), source),
    ];
    let nodes = chunk_documents(&documents, &ChunkingConfig::default());
    Arc::new(
        VectorIndex::build("logs", &documents, nodes, embedder, dir)
            .await
            .expect("index should build"),
    )
}

#[tokio::test]
async fn retrieve_returns_top_k_nodes() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new("fake"));
    let index = log_index(temp_dir.path(), Arc::clone(&embedder)).await;
    let engine = QueryEngine::new(index, embedder, Arc::new(ScriptedChatModel::default()));

    let nodes = engine
        .retrieve("order failed? order id of the order")
        .await
        .expect("retrieve should succeed");

    assert_eq!(nodes.len(), DEFAULT_SIMILARITY_TOP_K);
    assert_eq!(nodes[0].node.file_path, "order.log");
}

#[tokio::test]
async fn query_synthesizes_from_retrieved_context() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new("fake"));
    let index = log_index(temp_dir.path(), Arc::clone(&embedder)).await;
    let llm = Arc::new(ScriptedChatModel::new(vec![ScriptedChatModel::text(
        " Order 42 failed because stock went below zero. ",
    )]));
    let engine =
        QueryEngine::new(index, embedder, llm.clone()).with_similarity_top_k(1);

    let response = engine
        .query("why did the order fail? order 42, order stock")
        .await
        .expect("query should succeed");

    assert_eq!(
        response.response,
        "Order 42 failed because stock went below zero."
    );
    assert_eq!(response.to_string(), response.response);
    assert_eq!(response.source_nodes.len(), 1);

    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0][0].role, Role::User);
    let prompt = requests[0][0].content.clone().unwrap_or_default();
    assert!(prompt.contains("file_path: order.log"));
    assert!(prompt.contains("stock below zero"));
    assert!(prompt.contains("Query: why did the order fail? order 42, order stock"));
}

#[tokio::test]
async fn nothing_retrieved_skips_the_llm() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new("fake"));
    let index = log_index(temp_dir.path(), Arc::clone(&embedder)).await;
    let llm = Arc::new(ScriptedChatModel::default());
    let engine = QueryEngine::new(index, embedder, llm.clone()).with_similarity_top_k(0);

    let response = engine.query("anything").await.expect("query should succeed");

    assert_eq!(response.response, EMPTY_RESPONSE);
    assert!(response.source_nodes.is_empty());
    assert_eq!(llm.request_count(), 0);
}

#[test]
fn context_prompt_lists_every_node() {
    let node = |path: &str, text: &str| NodeWithScore {
        node: Node {
            id: path.to_string(),
            document_id: path.to_string(),
            text: text.to_string(),
            file_path: path.to_string(),
            extension: ".java".to_string(),
            chunk_index: 0,
            token_count: 4,
        },
        similarity_score: 1.0,
        distance: 0.0,
    };

    let prompt = build_context_prompt(
        "where is stock checked?",
        &[
            node("src/OrderService.java", "if (stock < 0) throw"),
            node("src/Stock.java", "class Stock {}"),
        ],
    );

    assert!(prompt.starts_with("Context information is below."));
    assert!(prompt.contains("file_path: src/OrderService.java\n\nif (stock < 0) throw"));
    assert!(prompt.contains("file_path: src/Stock.java"));
    assert!(prompt.ends_with("Query: where is stock checked?\nAnswer: "));
}
