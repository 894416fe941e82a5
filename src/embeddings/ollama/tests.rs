use super::*;
use crate::session::Role;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> OllamaConfig {
    OllamaConfig {
        host: server.address().ip().to_string(),
        port: server.address().port(),
        batch_size: 2,
        timeout_seconds: 5,
        ..OllamaConfig::default()
    }
}

fn client_for(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&config_for(server))
        .expect("client builds")
        .with_retry_attempts(1)
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-model".to_string(),
        batch_size: 128,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, config.retry_attempts);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);
    assert_eq!(client.retry_attempts, 5);

    let client = client.with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn empty_input_skips_the_server() {
    // Port 9 is discard; nothing listens there
    let config = OllamaConfig {
        port: 9,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("client builds");
    let embeddings = client.embed(&[]).expect("empty input needs no request");
    assert!(embeddings.is_empty());
}

#[tokio::test]
async fn embed_batches_preserve_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["alpha", "beta"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["gamma"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let embeddings = tokio::task::spawn_blocking(move || {
        client.embed(&["alpha".to_string(), "beta".to_string(), "gamma".to_string()])
    })
    .await
    .expect("task joins")
    .expect("embedding succeeds");

    assert_eq!(
        embeddings,
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]
    );
}

#[tokio::test]
async fn embed_count_mismatch_is_an_embedding_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || {
        client.embed(&["one".to_string(), "two".to_string()])
    })
    .await
    .expect("task joins");

    assert!(matches!(result, Err(QaError::Embedding(_))));
}

#[tokio::test]
async fn chat_sends_messages_without_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "stream": false,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Where is Loktak?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "In Manipur."},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let messages = vec![
        ChatMessage::new(Role::System, "Be brief."),
        ChatMessage::new(Role::User, "Where is Loktak?"),
    ];
    let answer = tokio::task::spawn_blocking(move || client.chat("llama3", &messages))
        .await
        .expect("task joins")
        .expect("chat succeeds");

    assert_eq!(answer, "In Manipur.");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).with_retry_attempts(3);
    let result = tokio::task::spawn_blocking(move || {
        client.chat("missing-model", &[ChatMessage::new(Role::User, "hello")])
    })
    .await
    .expect("task joins");

    let err = result.expect_err("404 fails");
    assert!(matches!(err, QaError::Completion(_)));
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    let client = client_for(&server).with_retry_attempts(2);
    tokio::task::spawn_blocking(move || client.ping())
        .await
        .expect("task joins")
        .expect("second attempt succeeds");
}

#[tokio::test]
async fn health_check_accepts_untagged_model_names() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3:latest", "size": 4661224676_u64},
                {"name": "nomic-embed-text:latest"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || {
        let models = client.list_models()?;
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].size, Some(4_661_224_676));

        client.health_check(&["llama3", "nomic-embed-text:latest"])?;
        assert!(client.health_check(&["mistral"]).is_err());
        anyhow::Ok(())
    })
    .await
    .expect("task joins");

    result.expect("health check passes");
}
