//! LanceDB backend: one table per index in a local (or object-store) database.

pub mod index_build;
pub mod predicate;
pub mod schema;
pub mod table;

use std::sync::Arc;

use arrow_array::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use selfquery_core::{Context, Error, FilterExpression, IndexConfig, IndexManager, Result, ScoredDocument};

use crate::backend::{Backend, EmbeddedDocument};
use crate::score;

use self::index_build::distance_type;
use self::schema::{batch_to_hits, build_index_schema, rows_to_record_batch};
use self::table::{lance_err, SERVICE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanceConfig {
    /// Database location: a directory path or an object-store URI.
    pub uri: String,
    /// Key/value table recording each index's definition.
    #[serde(default = "default_meta_table")]
    pub meta_table: String,
}

fn default_meta_table() -> String {
    "meta".to_string()
}

impl LanceConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), meta_table: default_meta_table() }
    }
}

fn meta_key(index: &str) -> String {
    format!("index:{index}")
}

pub struct LanceBackend {
    conn: Connection,
    config: LanceConfig,
    // Serializes this process's writers; Lance rejects conflicting concurrent commits.
    write_lock: Mutex<()>,
}

impl LanceBackend {
    pub async fn connect(config: LanceConfig) -> Result<Self> {
        let conn = table::open_db(&config.uri).await?;
        tracing::debug!(uri = %config.uri, "lancedb connected");
        Ok(Self { conn, config, write_lock: Mutex::new(()) })
    }

    /// Definition recorded when `name` was created.
    pub async fn load_index_config(&self, ctx: &Context, name: &str) -> Result<Option<IndexConfig>> {
        let raw = ctx.run(table::get_meta(&self.conn, &self.config.meta_table, &meta_key(name))).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(lance_err)).transpose()
    }

    /// Train the HNSW index over the rows ingested so far.
    pub async fn build_ann_index(&self, ctx: &Context, config: &IndexConfig) -> Result<bool> {
        self.require_table(&config.name).await?;
        let _guard = self.write_lock.lock().await;
        ctx.run(index_build::build_ann_index(&self.conn, config)).await
    }

    async fn require_table(&self, name: &str) -> Result<()> {
        if table::table_exists(&self.conn, name).await? {
            Ok(())
        } else {
            Err(Error::IndexNotFound { name: name.to_string() })
        }
    }
}

#[async_trait]
impl IndexManager for LanceBackend {
    async fn create_index(&self, ctx: &Context, config: &IndexConfig) -> Result<()> {
        config.validate()?;
        let schema = build_index_schema(config)?;
        let record = serde_json::to_string(config).map_err(lance_err)?;
        let _guard = self.write_lock.lock().await;
        ctx.run(async {
            if table::table_exists(&self.conn, &config.name).await? {
                return Err(Error::InvalidConfig(format!("index '{}' already exists", config.name)));
            }
            table::ensure_table(&self.conn, &config.name, schema).await?;
            table::set_meta(&self.conn, &self.config.meta_table, &meta_key(&config.name), &record).await
        })
        .await?;
        tracing::info!(index = %config.name, dim = config.vector_dimension, metric = config.distance_metric.as_str(), "lance index created");
        Ok(())
    }

    async fn delete_index(&self, ctx: &Context, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        ctx.run(async {
            self.require_table(name).await?;
            self.conn.drop_table(name, &[]).await.map_err(lance_err)?;
            table::delete_meta(&self.conn, &self.config.meta_table, &meta_key(name)).await
        })
        .await?;
        tracing::info!(index = name, "lance index deleted");
        Ok(())
    }

    async fn index_exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        ctx.run(table::table_exists(&self.conn, name)).await
    }
}

#[async_trait]
impl Backend for LanceBackend {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn upsert(
        &self,
        ctx: &Context,
        config: &IndexConfig,
        namespace: &str,
        rows: Vec<EmbeddedDocument>,
    ) -> Result<()> {
        let batch = rows_to_record_batch(config, namespace, &rows)?;
        let schema = batch.schema();
        let _guard = self.write_lock.lock().await;
        ctx.run(async {
            self.require_table(&config.name).await?;
            let t = self.conn.open_table(&config.name).execute().await.map_err(lance_err)?;
            let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), Arc::clone(&schema)));
            let mut mi = t.merge_insert(&["namespace", "id"]);
            mi.when_matched_update_all(None).when_not_matched_insert_all();
            mi.execute(reader).await.map_err(lance_err)?;
            Ok(())
        })
        .await
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
        let predicate = predicate::build_predicate(config, namespace, filter)?;
        let metric = config.distance_metric;
        ctx.run(async {
            self.require_table(&config.name).await?;
            let t = self.conn.open_table(&config.name).execute().await.map_err(lance_err)?;
            let mut stream = t
                .vector_search(vector.to_vec())
                .map_err(lance_err)?
                .distance_type(distance_type(metric))
                .ef(config.graph_params.ef_search as usize)
                .only_if(predicate)
                .select(Select::columns(&["id", "content", "metadata"]))
                .limit(k)
                .execute()
                .await
                .map_err(lance_err)?;
            let mut hits = Vec::new();
            while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
                hits.extend(batch_to_hits(&batch, |d| score::similarity_from_distance(metric, d))?);
            }
            Ok(hits)
        })
        .await
    }
}
