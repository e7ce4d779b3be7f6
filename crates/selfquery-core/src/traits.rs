use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::{Document, IndexConfig, ScoredDocument, SearchOptions, StructuredQuery};

/// Text-in, vector-out oracle.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:xxh64:d1536`).
    fn embedder_id(&self) -> &str;
    /// Dimensionality of every vector this embedder returns.
    fn dim(&self) -> usize;
    /// One vector per input text, in input order.
    async fn embed_batch(&self, ctx: &Context, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, ctx: &Context, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(ctx, &[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding { reason: "embedder returned no vector for query".to_string() })
    }
}

/// Text-in, text-out completion oracle used for query translation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn complete(&self, ctx: &Context, prompt: &str) -> Result<String>;
}

/// Similarity search and ingestion over one ANN index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert (or replace, by id) `docs` into `opts.namespace`, returning ids in input order.
    async fn add_documents(&self, ctx: &Context, docs: Vec<Document>, opts: &SearchOptions) -> Result<Vec<String>>;

    /// The `k` nearest documents to `query`, score-thresholded, best first.
    async fn similarity_search(
        &self,
        ctx: &Context,
        query: &str,
        k: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredDocument>>;

    /// Like [`VectorStore::similarity_search`] with `k = opts.max_results`,
    /// additionally restricted by the query's metadata filter.
    async fn filtered_similarity_search(
        &self,
        ctx: &Context,
        query: &StructuredQuery,
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredDocument>>;
}

/// Administrative creation and removal of ANN indexes.
#[async_trait]
pub trait IndexManager: Send + Sync {
    async fn create_index(&self, ctx: &Context, config: &IndexConfig) -> Result<()>;
    /// Fails with [`Error::IndexNotFound`] when no index named `name` exists.
    async fn delete_index(&self, ctx: &Context, name: &str) -> Result<()>;
    async fn index_exists(&self, ctx: &Context, name: &str) -> Result<bool>;
}
