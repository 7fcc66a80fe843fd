use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, batch_size: u32) -> OllamaClient {
    let address = server.address();
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
        model: "test-model".to_string(),
        batch_size,
    };
    OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_retry_policy(RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
        })
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry, RetryPolicy::default());
    assert_eq!(client.model_name(), "test-model");
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry.attempts, 5);
}

#[tokio::test]
async fn batch_requests_are_split_by_batch_size() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": "test-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let counter = Arc::new(TokenCounter::default());
    let client = client_for(&server, 2).with_token_counter(Arc::clone(&counter));
    let texts: Vec<String> = (0..4).map(|i| format!("log line number {}", i)).collect();

    let embeddings = client
        .generate_embeddings_batch(&texts)
        .expect("embedding should succeed");

    assert_eq!(embeddings.len(), 4);
    assert_eq!(embeddings[2], vec![0.1, 0.2, 0.3]);
    assert!(counter.snapshot().embedding_tokens > 0);
}

#[tokio::test]
async fn count_mismatch_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let texts = vec!["a".to_string(), "b".to_string()];
    assert!(client.generate_embeddings_batch(&texts).is_err());
}

#[tokio::test]
async fn single_embedding_uses_embed_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["which order failed?"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let embedding = client
        .embed_query("which order failed?")
        .expect("embedding should succeed");
    assert_eq!(embedding, vec![1.0, 0.0]);
}

#[tokio::test]
async fn health_check_requires_configured_model() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "other-model" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    assert!(client.health_check().is_err());

    let models = client.list_models().expect("listing should succeed");
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "other-model");
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.5]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    assert_eq!(
        client.generate_embedding("retry me").expect("second attempt succeeds"),
        vec![0.5]
    );
}
