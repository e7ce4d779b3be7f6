use async_trait::async_trait;

use selfquery_core::{Context, FilterExpression, IndexConfig, IndexManager, Metadata, Result, ScoredDocument};

/// A document whose id and vector are already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedDocument {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// Native operations of one ANN service.
///
/// Backends speak vectors only; embedding, thresholding and final ordering
/// live in [`crate::EmbeddingStore`] so they behave the same everywhere.
/// Index lifecycle comes from the [`IndexManager`] supertrait.
#[async_trait]
pub trait Backend: IndexManager {
    /// Short service name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Insert or replace `rows` (by id) in `namespace` of the index. All-or-nothing
    /// from the caller's view: rejected items surface as
    /// [`selfquery_core::Error::PartialBatchFailure`].
    async fn upsert(
        &self,
        ctx: &Context,
        config: &IndexConfig,
        namespace: &str,
        rows: Vec<EmbeddedDocument>,
    ) -> Result<()>;

    /// Up to `k` nearest rows to `vector` in `namespace`, restricted by `filter`.
    /// Scores use the backend's documented scale; order is not relied upon.
    async fn search(
        &self,
        ctx: &Context,
        config: &IndexConfig,
        namespace: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&FilterExpression>,
    ) -> Result<Vec<ScoredDocument>>;
}
