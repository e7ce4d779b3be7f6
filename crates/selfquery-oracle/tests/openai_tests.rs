use selfquery_core::{Context, Embedder, Error, LanguageModel};
use selfquery_oracle::{build_embedder, EmbedderSettings, OpenAiChatModel, OpenAiConfig, OpenAiEmbedder};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> OpenAiConfig {
    OpenAiConfig::default()
        .with_base_url(format!("{}/v1", server.uri()))
        .with_api_key("sk-test")
        .with_dimensions(3)
}

#[tokio::test]
async fn embeddings_are_returned_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0, 0.0]},
                {"index": 0, "embedding": [1.0, 0.0, 0.0]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(config(&server));
    let out = embedder
        .embed_batch(&Context::new(), &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(out, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn wrong_width_is_a_dimension_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0]}]
        })))
        .mount(&server)
        .await;

    let embedder = OpenAiEmbedder::new(config(&server));
    let err = embedder.embed_query(&Context::new(), "a").await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
}

#[tokio::test]
async fn rejected_request_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let model = OpenAiChatModel::new(config(&server));
    match model.complete(&Context::new(), "hi").await {
        Err(Error::BackendRequest { status, message, .. }) => {
            assert_eq!(status, Some(429));
            assert_eq!(message, "slow down");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn chat_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"messages": [{"role": "user", "content": "translate me"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"query\": \"x\"}"}}]
        })))
        .mount(&server)
        .await;

    let model = OpenAiChatModel::new(config(&server));
    let out = model.complete(&Context::new(), "translate me").await.unwrap();
    assert_eq!(out, "{\"query\": \"x\"}");
}

#[tokio::test]
async fn cancelled_context_skips_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = Context::new();
    ctx.cancel();
    let embedder = OpenAiEmbedder::new(config(&server));
    let err = embedder.embed_query(&ctx, "a").await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn fixture_settings_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("vectors.json");
    std::fs::write(&file, r#"{"dim": 2, "vectors": {"tokyo": [0.9, 0.436]}}"#).unwrap();
    let settings: EmbedderSettings =
        serde_json::from_value(json!({"provider": "fixture", "path": file})).unwrap();
    let embedder = build_embedder(settings).unwrap();
    assert_eq!(embedder.dim(), 2);
    assert_eq!(embedder.embedder_id(), "fixture:d2");
}
