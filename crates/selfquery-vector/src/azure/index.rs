//! Azure AI Search index definitions.

use serde_json::{json, Value};

use selfquery_core::{AttributeType, DistanceMetric, IndexConfig};

pub const HNSW_ALGORITHM: &str = "default-hnsw";
pub const VECTOR_PROFILE: &str = "default";
pub const VECTOR_FIELD: &str = "contentVector";

pub fn edm_type(attr: AttributeType) -> &'static str {
    match attr {
        AttributeType::String => "Edm.String",
        AttributeType::Integer => "Edm.Int64",
        AttributeType::Number => "Edm.Double",
        AttributeType::Boolean => "Edm.Boolean",
        AttributeType::Date => "Edm.DateTimeOffset",
    }
}

fn metric_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "cosine",
        DistanceMetric::Euclidean => "euclidean",
        DistanceMetric::Dot => "dotProduct",
    }
}

/// Body of `PUT /indexes/{name}`.
pub fn index_definition(config: &IndexConfig) -> Value {
    let mut fields = vec![
        json!({"name": "id", "type": "Edm.String", "key": true, "filterable": true}),
        json!({"name": "content", "type": "Edm.String", "searchable": true}),
        json!({
            "name": VECTOR_FIELD,
            "type": "Collection(Edm.Single)",
            "searchable": true,
            "dimensions": config.vector_dimension,
            "vectorSearchProfile": VECTOR_PROFILE,
        }),
        json!({"name": "metadata", "type": "Edm.String", "searchable": true}),
        json!({"name": "namespace", "type": "Edm.String", "filterable": true}),
    ];
    for attr in &config.filterable_fields {
        fields.push(json!({
            "name": attr.name,
            "type": edm_type(attr.attr_type),
            "filterable": true,
            "sortable": attr.attr_type != AttributeType::Boolean,
        }));
    }

    let g = &config.graph_params;
    json!({
        "name": config.name,
        "fields": fields,
        "vectorSearch": {
            "algorithms": [{
                "name": HNSW_ALGORITHM,
                "kind": "hnsw",
                "hnswParameters": {
                    "m": g.m,
                    "efConstruction": g.ef_construction,
                    "efSearch": g.ef_search,
                    "metric": metric_name(config.distance_metric),
                },
            }],
            "profiles": [{"name": VECTOR_PROFILE, "algorithm": HNSW_ALGORITHM}],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfquery_core::AttributeInfo;

    #[test]
    fn default_definition_carries_hnsw_params() {
        let def = index_definition(&IndexConfig::new("docs"));
        let params = &def["vectorSearch"]["algorithms"][0]["hnswParameters"];
        assert_eq!(params["m"], 4);
        assert_eq!(params["efConstruction"], 400);
        assert_eq!(params["efSearch"], 500);
        assert_eq!(params["metric"], "cosine");
        assert_eq!(def["fields"][2]["dimensions"], 1536);
    }

    #[test]
    fn attributes_become_filterable_fields() {
        let config = IndexConfig::new("cities")
            .with_filterable_fields(vec![AttributeInfo::new("population", AttributeType::Integer, "")]);
        let def = index_definition(&config);
        let fields = def["fields"].as_array().unwrap();
        let pop = fields.iter().find(|f| f["name"] == "population").unwrap();
        assert_eq!(pop["type"], "Edm.Int64");
        assert_eq!(pop["filterable"], true);
    }
}
