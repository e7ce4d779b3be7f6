use std::fs;

use proptest::prelude::*;
use selfquery_core::config::{resolve_with_base, Config};
use chrono::NaiveDate;
use selfquery_core::{
    AttributeInfo, AttributeType, Comparator, Error, FilterExpression, IndexConfig, SearchOptions, StructuredQuery,
};
use tempfile::TempDir;

fn city_schema() -> Vec<AttributeInfo> {
    vec![
        AttributeInfo::new("city", AttributeType::String, "name of the city"),
        AttributeInfo::new("country", AttributeType::String, "country the city belongs to"),
        AttributeInfo::new("population", AttributeType::Integer, "number of inhabitants"),
    ]
}

#[test]
fn config_merges_env_overlay_over_base_file() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[store]\nnamespace = \"base\"\nmax_results = 7\n",
    )
    .unwrap();
    fs::write(tmp.path().join("config.dev.toml"), "[store]\nnamespace = \"dev\"\n").unwrap();

    std::env::set_var("RUST_ENV", "dev");
    let config = Config::load_from(tmp.path()).expect("load");
    let opts: SearchOptions = config.get("store").expect("store section");
    assert_eq!(opts.namespace.as_deref(), Some("dev"));
    assert_eq!(opts.max_results, 7);
    assert_eq!(opts.score_threshold, None);
}

#[test]
fn missing_key_falls_back_to_default() {
    let tmp = TempDir::new().unwrap();
    let config = Config::load_from(tmp.path()).expect("load");
    let index: IndexConfig = config.get_or("index", IndexConfig::new("fallback")).expect("default");
    assert_eq!(index.name, "fallback");
    assert!(matches!(config.get::<IndexConfig>("index"), Err(Error::InvalidConfig(_))));
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = std::path::Path::new("/srv/data");
    assert_eq!(resolve_with_base(base, "lance"), base.join("lance"));
    assert_eq!(resolve_with_base(base, "/abs/lance"), std::path::PathBuf::from("/abs/lance"));
}

#[test]
fn structured_query_survives_json_round_trip() {
    let schema = vec![
        AttributeInfo::new("release", AttributeType::String, "release tag"),
        AttributeInfo::new("founded", AttributeType::Date, "founding date"),
    ];
    let founded = NaiveDate::from_ymd_opt(1600, 1, 1).unwrap();
    let filter = FilterExpression::and(vec![
        FilterExpression::eq("release", "2024-01-01"),
        FilterExpression::compare("founded", Comparator::Gt, founded),
    ])
    .validated(&schema)
    .unwrap();
    let query = StructuredQuery::new("old towns").with_filter(filter).with_limit(3);

    let json = serde_json::to_string(&query).unwrap();
    let back: StructuredQuery = serde_json::from_str(&json).unwrap();
    assert_eq!(back.semantic_query, "old towns");
    assert_eq!(back.limit, Some(3));
    let revalidated = back.filter.unwrap().validated(&schema).unwrap();
    assert_eq!(Some(revalidated), query.filter);
}

fn known_leaf() -> impl Strategy<Value = FilterExpression> {
    prop_oneof![
        "[a-zA-Z ]{1,12}".prop_map(|v| FilterExpression::eq("city", v)),
        "[a-zA-Z ]{1,12}".prop_map(|v| FilterExpression::compare("country", Comparator::Ne, v)),
        (0i64..10_000_000).prop_map(|v| FilterExpression::compare("population", Comparator::Gt, v)),
    ]
}

fn known_tree() -> impl Strategy<Value = FilterExpression> {
    known_leaf().prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(FilterExpression::and),
            prop::collection::vec(inner.clone(), 1..4).prop_map(FilterExpression::or),
            inner.prop_map(FilterExpression::not),
        ]
    })
}

proptest! {
    #[test]
    fn filters_over_declared_fields_validate(filter in known_tree()) {
        prop_assert!(filter.validated(&city_schema()).is_ok());
    }

    #[test]
    fn any_undeclared_field_is_reported(filter in known_tree(), field in "[a-z]{3,10}") {
        prop_assume!(!["city", "country", "population"].contains(&field.as_str()));
        let poisoned = FilterExpression::and(vec![filter, FilterExpression::eq(field.clone(), "x")]);
        match poisoned.validated(&city_schema()) {
            Err(Error::UnknownAttribute { attribute }) => prop_assert_eq!(attribute, field),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
