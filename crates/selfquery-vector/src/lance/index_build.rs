//! HNSW index builds for Lance tables.
//!
//! Lance trains its ANN structures from the rows present at build time, so the
//! index is built after ingestion (and rebuilt to apply new graph params).
//! Tables below [`MIN_ROWS_FOR_ANN`] are served by exact flat search instead.

use lancedb::index::vector::IvfHnswSqIndexBuilder;
use lancedb::index::Index;
use lancedb::{Connection, DistanceType};

use selfquery_core::{DistanceMetric, GraphParams, IndexConfig, Result};

use super::table::lance_err;

pub const MIN_ROWS_FOR_ANN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnParams {
    pub num_partitions: u32,
    pub num_edges: u32,
    pub ef_construction: u32,
}

pub fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::Euclidean => DistanceType::L2,
        DistanceMetric::Dot => DistanceType::Dot,
    }
}

/// IVF partitions grow with the square root of the row count; each partition
/// holds its own HNSW graph shaped by `graph`.
pub fn compute_ann_params(total_rows: usize, graph: &GraphParams) -> AnnParams {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let sqrt_n = (total_rows as f64).sqrt() as usize;
    let nlist = (sqrt_n / 4).clamp(1, 1024);
    AnnParams {
        num_partitions: u32::try_from(nlist).unwrap_or(1024),
        num_edges: graph.m,
        ef_construction: graph.ef_construction,
    }
}

pub fn index_name(table: &str) -> String {
    format!("{table}_vector_idx")
}

/// Build (or replace) the HNSW index on `config.name`. Returns `false` when the
/// table is too small to train one.
pub async fn build_ann_index(conn: &Connection, config: &IndexConfig) -> Result<bool> {
    let table = conn.open_table(&config.name).execute().await.map_err(lance_err)?;
    let rows = table.count_rows(None).await.map_err(lance_err)?;
    if rows < MIN_ROWS_FOR_ANN {
        tracing::info!(index = %config.name, rows, "too few rows for an ANN index; using flat search");
        return Ok(false);
    }
    let params = compute_ann_params(rows, &config.graph_params);
    table
        .create_index(
            &["vector"],
            Index::IvfHnswSq(
                IvfHnswSqIndexBuilder::default()
                    .distance_type(distance_type(config.distance_metric))
                    .num_partitions(params.num_partitions)
                    .num_edges(params.num_edges)
                    .ef_construction(params.ef_construction),
            ),
        )
        .name(index_name(&config.name))
        .replace(true)
        .execute()
        .await
        .map_err(lance_err)?;
    tracing::info!(
        index = %config.name,
        rows,
        partitions = params.num_partitions,
        m = params.num_edges,
        ef_construction = params.ef_construction,
        "ANN index built"
    );
    Ok(true)
}
