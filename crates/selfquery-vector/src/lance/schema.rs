//! Arrow layout of an index table.
//!
//! Fixed columns `id`, `namespace`, `content`, `metadata` (JSON text) and
//! `vector`, plus one typed, nullable column per declared filterable
//! attribute so predicates can be pushed down.

use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{
    Array, ArrayRef, BooleanArray, Date32Array, FixedSizeListArray, Float32Array, Float64Array, Int64Array,
    RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use selfquery_core::filter::DATE_FORMAT;
use selfquery_core::{AttributeType, Document, Error, IndexConfig, Metadata, Result, ScoredDocument};

use super::table::{lance_err, lance_msg};
use crate::backend::EmbeddedDocument;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn arrow_type(attr: AttributeType) -> DataType {
    match attr {
        AttributeType::String => DataType::Utf8,
        AttributeType::Integer => DataType::Int64,
        AttributeType::Number => DataType::Float64,
        AttributeType::Boolean => DataType::Boolean,
        AttributeType::Date => DataType::Date32,
    }
}

/// Attribute names become bare SQL identifiers, so keep them simple.
pub fn check_column_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("attribute '{name}' is not a valid column name")))
    }
}

pub fn build_index_schema(config: &IndexConfig) -> Result<Arc<Schema>> {
    let dim = i32::try_from(config.vector_dimension)
        .map_err(|_| Error::InvalidConfig(format!("dimension {} too large", config.vector_dimension)))?;
    let mut fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("namespace", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
    ];
    for attr in &config.filterable_fields {
        check_column_name(&attr.name)?;
        fields.push(Field::new(&attr.name, arrow_type(attr.attr_type), true));
    }
    fields.push(Field::new(
        "vector",
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
        true,
    ));
    Ok(Arc::new(Schema::new(fields)))
}

fn date_days(v: &Value) -> Option<i32> {
    let d = NaiveDate::parse_from_str(v.as_str()?, DATE_FORMAT).ok()?;
    Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

fn attribute_column(attr: AttributeType, name: &str, rows: &[EmbeddedDocument]) -> ArrayRef {
    let values = rows.iter().map(|r| r.metadata.get(name));
    match attr {
        AttributeType::String => {
            Arc::new(StringArray::from(values.map(|v| v.and_then(Value::as_str)).collect::<Vec<_>>()))
        }
        AttributeType::Integer => Arc::new(Int64Array::from(values.map(|v| v.and_then(Value::as_i64)).collect::<Vec<_>>())),
        AttributeType::Number => {
            Arc::new(Float64Array::from(values.map(|v| v.and_then(Value::as_f64)).collect::<Vec<_>>()))
        }
        AttributeType::Boolean => {
            Arc::new(BooleanArray::from(values.map(|v| v.and_then(Value::as_bool)).collect::<Vec<_>>()))
        }
        AttributeType::Date => Arc::new(Date32Array::from(values.map(|v| v.and_then(date_days)).collect::<Vec<_>>())),
    }
}

pub fn rows_to_record_batch(config: &IndexConfig, namespace: &str, rows: &[EmbeddedDocument]) -> Result<RecordBatch> {
    let schema = build_index_schema(config)?;
    let dim = i32::try_from(config.vector_dimension).map_err(lance_err)?;

    let metadata = rows
        .iter()
        .map(|r| serde_json::to_string(&r.metadata))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(lance_err)?;

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(vec![namespace; rows.len()])),
        Arc::new(StringArray::from(rows.iter().map(|r| r.content.as_str()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(metadata)),
    ];
    for attr in &config.filterable_fields {
        columns.push(attribute_column(attr.attr_type, &attr.name, rows));
    }
    let vectors = rows.iter().map(|r| Some(r.vector.iter().copied().map(Some).collect::<Vec<_>>()));
    columns.push(Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)));

    RecordBatch::try_new(schema, columns).map_err(lance_err)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| lance_msg(format!("result column '{name}' missing")))
}

/// Decode a search result batch; `to_score` maps `_distance` to a similarity.
pub fn batch_to_hits(batch: &RecordBatch, to_score: impl Fn(f32) -> f32) -> Result<Vec<ScoredDocument>> {
    let ids = string_column(batch, "id")?;
    let contents = string_column(batch, "content")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| lance_msg("result column '_distance' missing"))?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let meta: Metadata = if metadata.is_null(i) {
            Metadata::new()
        } else {
            serde_json::from_str(metadata.value(i)).map_err(lance_err)?
        };
        out.push(ScoredDocument {
            document: Document {
                id: Some(ids.value(i).to_string()),
                content: contents.value(i).to_string(),
                metadata: meta,
                embedding: None,
            },
            score: to_score(distances.value(i)),
        });
    }
    Ok(out)
}
