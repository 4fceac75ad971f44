use super::*;
use crate::config::OpenAiConfig;
use serial_test::serial;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(endpoint: &str, batch_size: u32) -> OpenAiConfig {
    OpenAiConfig {
        model: "text-embedding-3-large".to_string(),
        api_key: Some("test-key".to_string()),
        endpoint: Some(endpoint.to_string()),
        batch_size,
    }
}

fn embedding_json(index: usize, value: f32) -> serde_json::Value {
    serde_json::json!({ "index": index, "embedding": [value, value, value] })
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_order_is_preserved() {
    let server = MockServer::start().await;

    // Respond with embeddings out of index order; the client must
    // restore input order.
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [embedding_json(2, 3.0), embedding_json(0, 1.0), embedding_json(1, 2.0)],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri(), 100)).expect("client");
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let vectors = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("join")
        .expect("embed");

    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[0], vec![1.0, 1.0, 1.0]);
    assert_eq!(vectors[1], vec![2.0, 2.0, 2.0]);
    assert_eq!(vectors[2], vec![3.0, 3.0, 3.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn inputs_are_batched_by_configured_size() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(
            serde_json::json!({ "input": ["a", "b"] }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [embedding_json(0, 1.0), embedding_json(1, 2.0)],
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "input": ["c"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [embedding_json(0, 3.0)],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri(), 2)).expect("client");
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let vectors = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("join")
        .expect("embed");

    // Global ordering holds across batch boundaries.
    assert_eq!(vectors[2], vec![3.0, 3.0, 3.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn count_mismatch_is_a_shape_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [embedding_json(0, 1.0)],
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri(), 100)).expect("client");
    let texts = vec!["a".to_string(), "b".to_string()];

    let result = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("join");

    assert!(matches!(result, Err(KnowledgeError::ResponseShape(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [embedding_json(0, 1.0)],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri(), 100))
        .expect("client")
        .with_retry_attempts(2);
    let texts = vec!["a".to_string()];

    let vectors = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("join")
        .expect("embed should succeed after retry");

    assert_eq!(vectors.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&test_config(&server.uri(), 100)).expect("client");
    let texts = vec!["a".to_string()];

    let result = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("join");

    assert!(matches!(result, Err(KnowledgeError::Transport(_))));
}

#[test]
#[serial]
fn missing_api_key_is_a_config_error() {
    // Only meaningful when the ambient environment has no key set.
    if std::env::var("OPENAI_API_KEY").is_ok() {
        return;
    }

    let config = OpenAiConfig {
        api_key: None,
        ..OpenAiConfig::default()
    };
    assert!(matches!(
        OpenAiClient::new(&config),
        Err(KnowledgeError::Config(_))
    ));
}
