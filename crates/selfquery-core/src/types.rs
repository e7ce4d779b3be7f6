//! Domain types shared by the translator, the stores and the retriever.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{Error, Result};
use crate::filter::FilterExpression;

/// Metadata attached to a document. Values are expected to be JSON scalars.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Type of a metadata attribute as described to the translation oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Number,
    Boolean,
    Date,
}

impl AttributeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metadata field the corpus exposes for filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    pub description: String,
}

impl AttributeInfo {
    pub fn new(name: impl Into<String>, attr_type: AttributeType, description: impl Into<String>) -> Self {
        Self { name: name.into(), attr_type, description: description.into() }
    }
}

/// Reject schemas that declare the same attribute twice.
pub fn validate_schema(schema: &[AttributeInfo]) -> Result<()> {
    let mut seen = HashSet::new();
    for attr in schema {
        if attr.name.trim().is_empty() {
            return Err(Error::InvalidConfig("attribute name must not be empty".to_string()));
        }
        if !seen.insert(attr.name.as_str()) {
            return Err(Error::InvalidConfig(format!("duplicate attribute '{}'", attr.name)));
        }
    }
    Ok(())
}

pub fn find_attribute<'a>(schema: &'a [AttributeInfo], name: &str) -> Option<&'a AttributeInfo> {
    schema.iter().find(|a| a.name == name)
}

/// A unit of content stored in an index.
///
/// `id` is optional on ingestion; the store assigns one when absent. `embedding`
/// is normally left empty and computed by the store's embedder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Self::default() }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A search hit. Higher `score` is always better; the scale is backend-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Per-request store options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Logical partition inside the index. `None` selects the default partition.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Hits scoring below this value are dropped by the adapter.
    #[serde(default)]
    pub score_threshold: Option<f32>,
    /// Breadth of the nearest-neighbour search for filtered queries.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    4
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { namespace: None, score_threshold: None, max_results: default_max_results() }
    }
}

impl SearchOptions {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Partition key as stored by the backends; the default partition is `""`.
    pub fn namespace_key(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }
}

/// Output of the query translator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub semantic_query: String,
    pub filter: Option<FilterExpression>,
    /// Always positive when present.
    pub limit: Option<usize>,
}

impl StructuredQuery {
    pub fn new(semantic_query: impl Into<String>) -> Self {
        Self { semantic_query: semantic_query.into(), filter: None, limit: None }
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    Dot,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::Dot => "dot",
        }
    }
}

/// HNSW construction and search parameters.
///
/// Higher `m` and `ef_construction` raise recall at the cost of build time and
/// memory; higher `ef_search` raises recall at the cost of query latency.
/// The defaults (4 / 400 / 500) favour recall on small corpora of
/// 1536-dimensional cosine embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphParams {
    pub m: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self { m: 4, ef_construction: 400, ef_search: 500 }
    }
}

/// Definition of an ANN index, fixed at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    #[serde(default = "default_dimension")]
    pub vector_dimension: usize,
    #[serde(default)]
    pub graph_params: GraphParams,
    /// Metadata attributes the backend must be able to filter on.
    #[serde(default)]
    pub filterable_fields: Vec<AttributeInfo>,
}

fn default_dimension() -> usize {
    1536
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new("documents")
    }
}

impl IndexConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            distance_metric: DistanceMetric::default(),
            vector_dimension: default_dimension(),
            graph_params: GraphParams::default(),
            filterable_fields: Vec::new(),
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.vector_dimension = dim;
        self
    }

    pub fn with_graph_params(mut self, params: GraphParams) -> Self {
        self.graph_params = params;
        self
    }

    pub fn with_filterable_fields(mut self, fields: Vec<AttributeInfo>) -> Self {
        self.filterable_fields = fields;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("index name must not be empty".to_string()));
        }
        if self.vector_dimension == 0 {
            return Err(Error::InvalidConfig("vector_dimension must be positive".to_string()));
        }
        let g = &self.graph_params;
        if g.m == 0 || g.ef_construction == 0 || g.ef_search == 0 {
            return Err(Error::InvalidConfig(format!(
                "graph params must be positive (m={}, ef_construction={}, ef_search={})",
                g.m, g.ef_construction, g.ef_search
            )));
        }
        validate_schema(&self.filterable_fields)?;
        if self.filterable_fields.iter().any(|f| RESERVED_FIELDS.contains(&f.name.as_str())) {
            return Err(Error::InvalidConfig(format!(
                "filterable fields may not use reserved names {RESERVED_FIELDS:?}"
            )));
        }
        Ok(())
    }
}

/// Column names every backend uses for its own bookkeeping.
pub const RESERVED_FIELDS: &[&str] = &["id", "content", "namespace", "metadata", "vector", "contentVector"];
