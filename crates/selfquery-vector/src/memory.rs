//! Exact-scan backend held in process memory.
//!
//! Scores every row in the namespace, so results are the true nearest
//! neighbours. Filters are evaluated directly against document metadata.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::RwLock;

use selfquery_core::filter::DATE_FORMAT;
use selfquery_core::{
    Comparator, Context, Document, Error, FilterExpression, FilterValue, IndexConfig, IndexManager, Metadata, Operator,
    Result, ScoredDocument,
};

use crate::backend::{Backend, EmbeddedDocument};
use crate::score;

struct MemoryIndex {
    config: IndexConfig,
    namespaces: HashMap<String, BTreeMap<String, EmbeddedDocument>>,
}

#[derive(Default)]
pub struct MemoryBackend {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows stored in `namespace` of `index`.
    pub async fn count(&self, index: &str, namespace: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .and_then(|ix| ix.namespaces.get(namespace))
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl IndexManager for MemoryBackend {
    async fn create_index(&self, ctx: &Context, config: &IndexConfig) -> Result<()> {
        ctx.check()?;
        config.validate()?;
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(&config.name) {
            return Err(Error::InvalidConfig(format!("index '{}' already exists", config.name)));
        }
        indexes.insert(config.name.clone(), MemoryIndex { config: config.clone(), namespaces: HashMap::new() });
        tracing::info!(index = %config.name, dim = config.vector_dimension, metric = config.distance_metric.as_str(), "memory index created");
        Ok(())
    }

    async fn delete_index(&self, ctx: &Context, name: &str) -> Result<()> {
        ctx.check()?;
        match self.indexes.write().await.remove(name) {
            Some(_) => {
                tracing::info!(index = name, "memory index deleted");
                Ok(())
            }
            None => Err(Error::IndexNotFound { name: name.to_string() }),
        }
    }

    async fn index_exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        ctx.check()?;
        Ok(self.indexes.read().await.contains_key(name))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(
        &self,
        ctx: &Context,
        config: &IndexConfig,
        namespace: &str,
        rows: Vec<EmbeddedDocument>,
    ) -> Result<()> {
        ctx.check()?;
        let mut indexes = self.indexes.write().await;
        let index = indexes
            .get_mut(&config.name)
            .ok_or_else(|| Error::IndexNotFound { name: config.name.clone() })?;
        let bucket = index.namespaces.entry(namespace.to_string()).or_default();
        for row in rows {
            bucket.insert(row.id.clone(), row);
        }
        Ok(())
    }

    async fn search(
        &self,
        ctx: &Context,
        config: &IndexConfig,
        namespace: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&FilterExpression>,
    ) -> Result<Vec<ScoredDocument>> {
        ctx.check()?;
        let indexes = self.indexes.read().await;
        let index = indexes
            .get(&config.name)
            .ok_or_else(|| Error::IndexNotFound { name: config.name.clone() })?;
        let Some(bucket) = index.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };
        let metric = index.config.distance_metric;
        let hits = bucket
            .values()
            .filter(|row| filter.map_or(true, |f| matches(f, &row.metadata)))
            .map(|row| ScoredDocument {
                document: Document {
                    id: Some(row.id.clone()),
                    content: row.content.clone(),
                    metadata: row.metadata.clone(),
                    embedding: None,
                },
                score: score::similarity(metric, vector, &row.vector),
            })
            .collect();
        Ok(score::rank(hits, None, k))
    }
}

/// Evaluate `filter` against one document's metadata. Leaves over missing
/// attributes are false, like SQL comparisons with NULL.
pub fn matches(filter: &FilterExpression, metadata: &Metadata) -> bool {
    match filter {
        FilterExpression::Composite { operator: Operator::And, children } => children.iter().all(|c| matches(c, metadata)),
        FilterExpression::Composite { operator: Operator::Or, children } => children.iter().any(|c| matches(c, metadata)),
        FilterExpression::Composite { operator: Operator::Not, children } => !children.iter().all(|c| matches(c, metadata)),
        FilterExpression::Comparison { attribute, comparator, value } => match metadata.get(attribute) {
            None | Some(Value::Null) => false,
            Some(actual) => compare_leaf(actual, *comparator, value),
        },
    }
}

fn compare_leaf(actual: &Value, comparator: Comparator, expected: &FilterValue) -> bool {
    let ord = || order(actual, expected);
    match comparator {
        Comparator::Eq => ord() == Some(Ordering::Equal),
        Comparator::Ne => ord().is_some_and(|o| o != Ordering::Equal),
        Comparator::Gt => ord() == Some(Ordering::Greater),
        Comparator::Gte => matches!(ord(), Some(Ordering::Greater | Ordering::Equal)),
        Comparator::Lt => ord() == Some(Ordering::Less),
        Comparator::Lte => matches!(ord(), Some(Ordering::Less | Ordering::Equal)),
        Comparator::In => list(expected).iter().any(|v| order(actual, v) == Some(Ordering::Equal)),
        Comparator::Nin => list(expected).iter().all(|v| order(actual, v) != Some(Ordering::Equal)),
        Comparator::Like => match (actual, expected) {
            (Value::String(s), FilterValue::String(pattern)) => like(s, pattern),
            _ => false,
        },
    }
}

fn list(value: &FilterValue) -> &[FilterValue] {
    match value {
        FilterValue::List(items) => items,
        other => std::slice::from_ref(other),
    }
}

/// `actual` relative to `expected`, or `None` when the two are not comparable.
fn order(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    match (actual, expected) {
        (Value::String(a), FilterValue::String(e)) => Some(a.as_str().cmp(e.as_str())),
        (Value::String(a), FilterValue::Date(e)) => NaiveDate::parse_from_str(a, DATE_FORMAT).ok().map(|d| d.cmp(e)),
        (Value::Bool(a), FilterValue::Bool(e)) => Some(a.cmp(e)),
        (Value::Number(a), FilterValue::Integer(_) | FilterValue::Number(_)) => {
            a.as_f64().zip(expected.as_f64()).and_then(|(a, e)| a.partial_cmp(&e))
        }
        _ => None,
    }
}

/// SQL `LIKE`: `%` matches any run, `_` exactly one character.
fn like(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Metadata {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn like_wildcards() {
        assert!(like("Tokyo", "Tok%"));
        assert!(like("Tokyo", "%yo"));
        assert!(like("Tokyo", "T_kyo"));
        assert!(like("Tokyo", "%"));
        assert!(!like("Tokyo", "Osaka%"));
        assert!(!like("Tokyo", "T_yo"));
    }

    #[test]
    fn numeric_comparison_mixes_integer_and_float() {
        let m = meta(json!({"population": 13_960_000}));
        assert!(matches(&FilterExpression::compare("population", Comparator::Gt, 2_000_000), &m));
        assert!(matches(&FilterExpression::compare("population", Comparator::Lte, 1.4e7), &m));
    }

    #[test]
    fn dates_compare_chronologically() {
        let m = meta(json!({"founded": "1868-09-03"}));
        let cutoff = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap();
        assert!(matches(&FilterExpression::compare("founded", Comparator::Lt, cutoff), &m));
    }

    #[test]
    fn missing_attribute_never_matches() {
        let m = meta(json!({"country": "Japan"}));
        assert!(!matches(&FilterExpression::compare("city", Comparator::Ne, "Paris"), &m));
        assert!(matches(&FilterExpression::not(FilterExpression::eq("city", "Paris")), &m));
    }

    #[test]
    fn composites() {
        let m = meta(json!({"country": "Japan", "capital": true}));
        let f = FilterExpression::and(vec![
            FilterExpression::eq("country", "Japan"),
            FilterExpression::or(vec![
                FilterExpression::eq("capital", true),
                FilterExpression::compare("country", Comparator::In, vec!["France"]),
            ]),
        ]);
        assert!(matches(&f, &m));
        assert!(!matches(&FilterExpression::compare("country", Comparator::Nin, vec!["Japan", "France"]), &m));
    }
}
