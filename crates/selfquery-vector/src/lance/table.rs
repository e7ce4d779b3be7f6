//! LanceDB connection and housekeeping helpers.
//!
//! Besides opening tables this keeps a small key/value `meta` table where each
//! index's [`IndexConfig`] is recorded next to its data.

use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};

use selfquery_core::{Error, Result};

pub(crate) const SERVICE: &str = "lancedb";

pub(crate) fn lance_err<E>(e: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::backend(SERVICE, e)
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(lance_err)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(lance_err)?;
    Ok(names.iter().any(|n| n == name))
}

/// Create an empty table with `schema` unless one named `name` exists.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await.map_err(lance_err)?;
    Ok(())
}

fn build_meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}

pub(crate) fn lance_msg(message: impl Into<String>) -> Error {
    Error::BackendRequest { service: SERVICE.to_string(), status: None, message: message.into(), source: None }
}

/// Single-quoted SQL string literal.
pub(crate) fn sql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_table(conn, table, build_meta_schema()).await?;
    let t = conn.open_table(table).execute().await.map_err(lance_err)?;
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )
    .map_err(lance_err)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    // key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await.map_err(lance_err)?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, table).await? {
        return Ok(None);
    }
    let t = conn.open_table(table).execute().await.map_err(lance_err)?;
    let mut stream = t
        .query()
        .only_if(format!("key = {}", sql_quote(key)))
        .execute()
        .await
        .map_err(lance_err)?;
    while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
        if batch.num_rows() == 0 {
            continue;
        }
        let val = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| lance_msg("meta.value column missing"))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

pub async fn delete_meta(conn: &Connection, table: &str, key: &str) -> Result<()> {
    if !table_exists(conn, table).await? {
        return Ok(());
    }
    let t = conn.open_table(table).execute().await.map_err(lance_err)?;
    t.delete(&format!("key = {}", sql_quote(key))).await.map_err(lance_err)?;
    Ok(())
}
