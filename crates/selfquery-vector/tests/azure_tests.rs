use std::path::Path;
use std::sync::Arc;

use selfquery_core::{
    AttributeInfo, AttributeType, Context, Document, Error, FilterExpression, IndexConfig, IndexManager,
    SearchOptions, StructuredQuery, VectorStore,
};
use selfquery_oracle::FixtureEmbedder;
use selfquery_vector::{AzureSearchBackend, AzureSearchConfig, EmbeddingStore};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> Arc<AzureSearchBackend> {
    Arc::new(AzureSearchBackend::new(AzureSearchConfig::new(server.uri()).with_api_key("secret")))
}

fn store(server: &MockServer, config: IndexConfig) -> EmbeddingStore<AzureSearchBackend> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cities.json");
    let embedder = Arc::new(FixtureEmbedder::from_path(&path).expect("fixture"));
    EmbeddingStore::new(backend(server), embedder, config)
}

#[tokio::test]
async fn create_index_puts_hnsw_definition() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/indexes/cities"))
        .and(query_param("api-version", "2023-11-01"))
        .and(header("api-key", "secret"))
        .and(body_partial_json(json!({
            "name": "cities",
            "vectorSearch": {"profiles": [{"name": "default", "algorithm": "default-hnsw"}]}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "cities"})))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server)
        .create_index(&Context::new(), &IndexConfig::new("cities"))
        .await
        .expect("create");
}

#[tokio::test]
async fn deleting_a_missing_index_is_index_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/indexes/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": {"message": "No index with the name 'ghost'"}})))
        .mount(&server)
        .await;

    let err = backend(&server).delete_index(&Context::new(), "ghost").await.unwrap_err();
    assert!(matches!(err, Error::IndexNotFound { name } if name == "ghost"));
}

#[tokio::test]
async fn server_errors_keep_their_status() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = backend(&server).delete_index(&Context::new(), "cities").await.unwrap_err();
    assert!(matches!(err, Error::BackendRequest { status: Some(503), .. }));
}

#[tokio::test]
async fn index_exists_maps_404_to_false() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/cities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "cities"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let b = backend(&server);
    assert!(b.index_exists(&Context::new(), "cities").await.unwrap());
    assert!(!b.index_exists(&Context::new(), "ghost").await.unwrap());
}

#[tokio::test]
async fn rejected_items_surface_as_partial_batch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/cities/docs/index"))
        .and(body_partial_json(json!({"value": [{"id": "tokyo", "namespace": "jp"}, {"id": "potato"}]})))
        .respond_with(ResponseTemplate::new(207).set_body_json(json!({
            "value": [
                {"key": "tokyo", "status": true, "errorMessage": null, "statusCode": 201},
                {"key": "potato", "status": false, "errorMessage": "Document is too large", "statusCode": 400}
            ]
        })))
        .mount(&server)
        .await;

    let store = store(&server, IndexConfig::new("cities").with_dimension(4));
    let docs = vec![Document::new("tokyo").with_id("tokyo"), Document::new("potato").with_id("potato")];
    let err = store
        .add_documents(&Context::new(), docs, &SearchOptions::default().with_namespace("jp"))
        .await
        .unwrap_err();
    match err {
        Error::PartialBatchFailure { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].index, 1);
            assert_eq!(failures[0].id, "potato");
            assert_eq!(failures[0].reason, "Document is too large");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn search_sends_odata_filter_and_thresholds_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/cities/docs/search"))
        .and(body_partial_json(json!({
            "filter": "namespace eq 'jp' and (country eq 'Japan')",
            "top": 3,
            "vectorQueries": [{"kind": "vector", "fields": "contentVector", "k": 3}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"@search.score": 0.86, "id": "osaka", "content": "Osaka", "metadata": "{\"country\":\"Japan\"}"},
                {"@search.score": 0.95, "id": "tokyo", "content": "Tokyo", "metadata": "{\"country\":\"Japan\"}"},
                {"@search.score": 0.70, "id": "nara", "content": "Nara", "metadata": "{\"country\":\"Japan\"}"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = IndexConfig::new("cities")
        .with_dimension(4)
        .with_filterable_fields(vec![AttributeInfo::new("country", AttributeType::String, "")]);
    let store = store(&server, config);
    let query = StructuredQuery::new("Which of these are cities in Japan")
        .with_filter(FilterExpression::eq("country", "Japan"));
    let opts = SearchOptions::default()
        .with_namespace("jp")
        .with_max_results(3)
        .with_score_threshold(0.8);
    let hits = store.filtered_similarity_search(&Context::new(), &query, &opts).await.expect("search");
    let ids: Vec<_> = hits.iter().filter_map(|h| h.document.id.as_deref()).collect();
    assert_eq!(ids, vec!["tokyo", "osaka"]);
    assert_eq!(hits[0].document.metadata["country"], "Japan");
}

#[tokio::test]
async fn search_on_missing_index_is_index_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/ghost/docs/search"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = store(&server, IndexConfig::new("ghost").with_dimension(4));
    let err = store
        .similarity_search(&Context::new(), "japan", 1, &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IndexNotFound { .. }));
}
