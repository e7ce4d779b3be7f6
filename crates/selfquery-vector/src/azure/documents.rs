//! Request and response bodies for document upload and vector search.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use selfquery_core::{AttributeType, BatchItemFailure, Document, IndexConfig, Metadata, ScoredDocument};

use super::index::VECTOR_FIELD;
use crate::backend::EmbeddedDocument;

/// Body of `POST /indexes/{name}/docs/index`.
pub fn upload_body(config: &IndexConfig, namespace: &str, rows: &[EmbeddedDocument]) -> Value {
    let value: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut doc = Map::new();
            doc.insert("@search.action".into(), json!("mergeOrUpload"));
            doc.insert("id".into(), json!(row.id));
            doc.insert("content".into(), json!(row.content));
            doc.insert(VECTOR_FIELD.into(), json!(row.vector));
            doc.insert("metadata".into(), json!(serde_json::to_string(&row.metadata).unwrap_or_default()));
            doc.insert("namespace".into(), json!(namespace));
            for attr in &config.filterable_fields {
                if let Some(v) = row.metadata.get(&attr.name) {
                    doc.insert(attr.name.clone(), field_value(attr.attr_type, v));
                }
            }
            Value::Object(doc)
        })
        .collect();
    json!({ "value": value })
}

/// Dates travel as `Edm.DateTimeOffset`.
fn field_value(attr: AttributeType, v: &Value) -> Value {
    match (attr, v) {
        (AttributeType::Date, Value::String(s)) if s.len() == 10 => json!(format!("{s}T00:00:00Z")),
        _ => v.clone(),
    }
}

#[derive(Debug, Deserialize)]
pub struct IndexingResponse {
    pub value: Vec<IndexingResult>,
}

#[derive(Debug, Deserialize)]
pub struct IndexingResult {
    pub key: String,
    pub status: bool,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(rename = "statusCode", default)]
    pub status_code: u16,
}

/// Items the service refused, positioned by the caller's input order.
pub fn failures(rows: &[EmbeddedDocument], response: &IndexingResponse) -> Vec<BatchItemFailure> {
    response
        .value
        .iter()
        .filter(|r| !r.status)
        .map(|r| BatchItemFailure {
            index: rows.iter().position(|row| row.id == r.key).unwrap_or(usize::MAX),
            id: r.key.clone(),
            reason: r
                .error_message
                .clone()
                .unwrap_or_else(|| format!("status {}", r.status_code)),
        })
        .collect()
}

/// Body of `POST /indexes/{name}/docs/search`.
pub fn search_body(vector: &[f32], k: usize, filter: &str) -> Value {
    json!({
        "vectorQueries": [{
            "kind": "vector",
            "vector": vector,
            "fields": VECTOR_FIELD,
            "k": k,
        }],
        "vectorFilterMode": "preFilter",
        "filter": filter,
        "select": "id,content,metadata",
        "top": k,
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "@search.score")]
    pub score: f32,
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
}

impl SearchHit {
    pub fn into_scored(self) -> ScoredDocument {
        let metadata: Metadata = self
            .metadata
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or_default();
        ScoredDocument {
            document: Document { id: Some(self.id), content: self.content.unwrap_or_default(), metadata, embedding: None },
            score: self.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfquery_core::AttributeInfo;

    #[test]
    fn upload_flattens_declared_attributes() {
        let config = IndexConfig::new("cities").with_dimension(2).with_filterable_fields(vec![
            AttributeInfo::new("founded", AttributeType::Date, ""),
            AttributeInfo::new("country", AttributeType::String, ""),
        ]);
        let mut metadata = Metadata::new();
        metadata.insert("founded".into(), "1457-01-01".into());
        metadata.insert("country".into(), "Japan".into());
        let row = EmbeddedDocument { id: "tokyo".into(), content: "Tokyo".into(), metadata, vector: vec![1.0, 0.0] };

        let body = upload_body(&config, "t1", &[row]);
        let doc = &body["value"][0];
        assert_eq!(doc["@search.action"], "mergeOrUpload");
        assert_eq!(doc["namespace"], "t1");
        assert_eq!(doc["founded"], "1457-01-01T00:00:00Z");
        assert_eq!(doc["country"], "Japan");
        let meta: Metadata = serde_json::from_str(doc["metadata"].as_str().unwrap()).unwrap();
        assert_eq!(meta["country"], "Japan");
    }

    #[test]
    fn hits_decode_metadata_text() {
        let hit: SearchHit = serde_json::from_value(json!({
            "@search.score": 0.91,
            "id": "tokyo",
            "content": "Tokyo",
            "metadata": "{\"country\":\"Japan\"}"
        }))
        .unwrap();
        let scored = hit.into_scored();
        assert_eq!(scored.document.metadata["country"], "Japan");
        assert!((scored.score - 0.91).abs() < 1e-6);
    }
}
