use std::path::Path;
use std::sync::Arc;

use selfquery_core::{
    AttributeInfo, AttributeType, Comparator, Context, Document, Error, FilterExpression, IndexConfig, IndexManager,
    SearchOptions, StructuredQuery, VectorStore,
};
use selfquery_oracle::FixtureEmbedder;
use selfquery_vector::{Backend, EmbeddingStore, LanceBackend, LanceConfig, MemoryBackend};
use tempfile::TempDir;

fn fixture_embedder() -> Arc<FixtureEmbedder> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cities.json");
    Arc::new(FixtureEmbedder::from_path(&path).expect("fixture"))
}

fn city_index() -> IndexConfig {
    IndexConfig::new("cities").with_dimension(4).with_filterable_fields(vec![
        AttributeInfo::new("country", AttributeType::String, "country the city is in"),
        AttributeInfo::new("population", AttributeType::Integer, "inhabitants"),
    ])
}

#[tokio::test]
async fn lancedb_store_flow() {
    let tmp = TempDir::new().expect("tmp");
    let ctx = Context::new();
    let backend = Arc::new(
        LanceBackend::connect(LanceConfig::new(tmp.path().to_string_lossy()))
            .await
            .expect("connect"),
    );
    let config = city_index();
    backend.create_index(&ctx, &config).await.expect("create");
    assert!(backend.index_exists(&ctx, "cities").await.unwrap());
    assert_eq!(backend.load_index_config(&ctx, "cities").await.unwrap(), Some(config.clone()));

    let store = EmbeddingStore::new(backend.clone(), fixture_embedder(), config);
    let opts = SearchOptions::default();
    let docs = vec![
        Document::new("Tokyo").with_id("tokyo").with_metadata("country", "Japan").with_metadata("population", 13_960_000),
        Document::new("Osaka").with_id("osaka").with_metadata("country", "Japan").with_metadata("population", 2_750_000),
        Document::new("Paris").with_id("paris").with_metadata("country", "France").with_metadata("population", 2_100_000),
        Document::new("Dublin").with_id("dublin").with_metadata("country", "Ireland"),
    ];
    let ids = store.add_documents(&ctx, docs, &opts).await.expect("add");
    assert_eq!(ids, vec!["tokyo", "osaka", "paris", "dublin"]);

    let hits = store
        .similarity_search(&ctx, "Which of these are cities in Japan", 4, &opts)
        .await
        .expect("search");
    let order: Vec<_> = hits.iter().map(|h| h.document.content.as_str()).collect();
    assert_eq!(order, vec!["Tokyo", "Osaka", "Paris", "Dublin"]);
    assert!((hits[0].score - 0.95).abs() < 1e-3);
    assert_eq!(hits[0].document.metadata["country"], "Japan");

    let query = StructuredQuery::new("Which of these are cities in Japan")
        .with_filter(FilterExpression::eq("country", "Japan"));
    let hits = store
        .filtered_similarity_search(&ctx, &query, &opts.clone().with_score_threshold(0.93))
        .await
        .expect("filtered");
    let order: Vec<_> = hits.iter().map(|h| h.document.content.as_str()).collect();
    assert_eq!(order, vec!["Tokyo"]);

    // other namespaces see nothing
    let hits = store
        .similarity_search(&ctx, "japan", 4, &SearchOptions::default().with_namespace("elsewhere"))
        .await
        .unwrap();
    assert!(hits.is_empty());

    // too few rows to train, flat search keeps working
    assert!(!backend.build_ann_index(&ctx, store.index()).await.unwrap());

    backend.delete_index(&ctx, "cities").await.expect("delete");
    assert!(!backend.index_exists(&ctx, "cities").await.unwrap());
    assert_eq!(backend.load_index_config(&ctx, "cities").await.unwrap(), None);
}

#[tokio::test]
async fn lancedb_missing_index_errors() {
    let tmp = TempDir::new().expect("tmp");
    let ctx = Context::new();
    let backend = LanceBackend::connect(LanceConfig::new(tmp.path().to_string_lossy()))
        .await
        .expect("connect");

    let err = backend.delete_index(&ctx, "ghost").await.unwrap_err();
    assert!(matches!(err, Error::IndexNotFound { name } if name == "ghost"));

    let config = city_index();
    backend.create_index(&ctx, &config).await.unwrap();
    assert!(matches!(backend.create_index(&ctx, &config).await, Err(Error::InvalidConfig(_))));
}

async fn filtered_ids<B: Backend>(backend: Arc<B>, config: IndexConfig, filter: &FilterExpression) -> Vec<String> {
    let ctx = Context::new();
    backend.create_index(&ctx, &config).await.expect("create");
    let store = EmbeddingStore::new(backend, fixture_embedder(), config);
    let opts = SearchOptions::default().with_max_results(10);
    let docs = vec![
        Document::new("Tokyo").with_id("tokyo").with_metadata("country", "Japan"),
        Document::new("Paris").with_id("paris").with_metadata("country", "France"),
        Document::new("Dublin").with_id("dublin"),
    ];
    store.add_documents(&ctx, docs, &opts).await.expect("add");
    let query = StructuredQuery::new("japan").with_filter(filter.clone());
    let hits = store.filtered_similarity_search(&ctx, &query, &opts).await.expect("search");
    hits.into_iter().filter_map(|h| h.document.id).collect()
}

#[tokio::test]
async fn missing_attribute_filters_agree_with_memory() {
    let filters = [
        FilterExpression::not(FilterExpression::eq("country", "France")),
        FilterExpression::compare("country", Comparator::Ne, "France"),
        FilterExpression::compare("country", Comparator::Nin, vec!["France"]),
        FilterExpression::or(vec![
            FilterExpression::eq("country", "France"),
            FilterExpression::not(FilterExpression::compare("population", Comparator::Gt, 1_000_000)),
        ]),
    ];
    for filter in &filters {
        let tmp = TempDir::new().expect("tmp");
        let lance = Arc::new(
            LanceBackend::connect(LanceConfig::new(tmp.path().to_string_lossy()))
                .await
                .expect("connect"),
        );
        let from_lance = filtered_ids(lance, city_index(), filter).await;
        let from_memory = filtered_ids(Arc::new(MemoryBackend::new()), city_index(), filter).await;
        assert_eq!(from_lance, from_memory, "{filter}");
    }

    let tmp = TempDir::new().expect("tmp");
    let lance = Arc::new(LanceBackend::connect(LanceConfig::new(tmp.path().to_string_lossy())).await.expect("connect"));
    let not_france = FilterExpression::not(FilterExpression::eq("country", "France"));
    assert_eq!(filtered_ids(lance, city_index(), &not_france).await, vec!["tokyo", "dublin"]);
}
