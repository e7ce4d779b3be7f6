use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use selfquery_core::{
    Context, Document, Embedder, Error, FilterExpression, IndexConfig, IndexManager, Result, ScoredDocument,
    SearchOptions, StructuredQuery, VectorStore,
};

use crate::backend::{Backend, EmbeddedDocument};
use crate::score;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Texts per embedding call; calls for one batch run concurrently.
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

fn default_embed_batch_size() -> usize {
    16
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { embed_batch_size: default_embed_batch_size() }
    }
}

/// [`VectorStore`] over any [`Backend`]: embeds text, checks widths, delegates
/// the ANN query, then applies the score threshold and final ordering itself.
pub struct EmbeddingStore<B> {
    backend: Arc<B>,
    embedder: Arc<dyn Embedder>,
    index: IndexConfig,
    settings: StoreSettings,
}

impl<B: Backend> EmbeddingStore<B> {
    pub fn new(backend: Arc<B>, embedder: Arc<dyn Embedder>, index: IndexConfig) -> Self {
        Self { backend, embedder, index, settings: StoreSettings::default() }
    }

    pub fn with_settings(mut self, settings: StoreSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn index(&self) -> &IndexConfig {
        &self.index
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.index.vector_dimension {
            Ok(())
        } else {
            Err(Error::DimensionMismatch { expected: self.index.vector_dimension, actual: vector.len() })
        }
    }

    /// Vectors for `docs` in input order, embedding only those without one.
    async fn resolve_vectors(&self, ctx: &Context, docs: &[Document]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = docs
            .iter()
            .filter(|d| d.embedding.is_none())
            .map(|d| d.content.clone())
            .collect();

        let batch = self.settings.embed_batch_size.max(1);
        let calls = texts.chunks(batch).map(|chunk| self.embedder.embed_batch(ctx, chunk));
        let embedded: Vec<Vec<f32>> = try_join_all(calls).await?.into_iter().flatten().collect();
        if embedded.len() != texts.len() {
            return Err(Error::Embedding {
                reason: format!("requested {} embeddings, received {}", texts.len(), embedded.len()),
            });
        }

        // `embedded` follows document order among those lacking a vector.
        let mut fresh = embedded.into_iter();
        let mut out = Vec::with_capacity(docs.len());
        for (i, doc) in docs.iter().enumerate() {
            let vector = match &doc.embedding {
                Some(v) => v.clone(),
                None => fresh
                    .next()
                    .ok_or_else(|| Error::Embedding { reason: format!("no vector produced for document #{i}") })?,
            };
            self.check_dim(&vector)?;
            out.push(vector);
        }
        Ok(out)
    }

    /// Check a filter against the index's declared attributes, when it has any.
    fn checked_filter(&self, filter: Option<&FilterExpression>) -> Result<Option<FilterExpression>> {
        match filter {
            None => Ok(None),
            Some(f) if self.index.filterable_fields.is_empty() => Ok(Some(f.clone())),
            Some(f) => f.clone().validated(&self.index.filterable_fields).map(Some),
        }
    }

    async fn search_text(
        &self,
        ctx: &Context,
        query: &str,
        k: usize,
        opts: &SearchOptions,
        filter: Option<&FilterExpression>,
    ) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Err(Error::InvalidK { k });
        }
        let filter = self.checked_filter(filter)?;
        let vector = self.embedder.embed_query(ctx, query).await?;
        self.check_dim(&vector)?;

        let raw = self
            .backend
            .search(ctx, &self.index, opts.namespace_key(), &vector, k, filter.as_ref())
            .await?;
        let raw_hits = raw.len();
        let hits = score::rank(raw, opts.score_threshold, k);
        tracing::debug!(
            backend = self.backend.name(),
            index = %self.index.name,
            namespace = opts.namespace_key(),
            k,
            filtered = filter.is_some(),
            raw_hits,
            hits = hits.len(),
            "similarity search"
        );
        Ok(hits)
    }
}

#[async_trait]
impl<B: Backend> VectorStore for EmbeddingStore<B> {
    async fn add_documents(&self, ctx: &Context, docs: Vec<Document>, opts: &SearchOptions) -> Result<Vec<String>> {
        ctx.check()?;
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.resolve_vectors(ctx, &docs).await?;
        let rows: Vec<EmbeddedDocument> = docs
            .into_iter()
            .zip(vectors)
            .map(|(doc, vector)| EmbeddedDocument {
                id: doc.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                content: doc.content,
                metadata: doc.metadata,
                vector,
            })
            .collect();
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

        self.backend.upsert(ctx, &self.index, opts.namespace_key(), rows).await?;
        tracing::debug!(
            backend = self.backend.name(),
            index = %self.index.name,
            namespace = opts.namespace_key(),
            count = ids.len(),
            "documents added"
        );
        Ok(ids)
    }

    async fn similarity_search(
        &self,
        ctx: &Context,
        query: &str,
        k: usize,
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredDocument>> {
        self.search_text(ctx, query, k, opts, None).await
    }

    async fn filtered_similarity_search(
        &self,
        ctx: &Context,
        query: &StructuredQuery,
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredDocument>> {
        self.search_text(ctx, &query.semantic_query, opts.max_results, opts, query.filter.as_ref())
            .await
    }
}

#[async_trait]
impl<B: Backend> IndexManager for EmbeddingStore<B> {
    async fn create_index(&self, ctx: &Context, config: &IndexConfig) -> Result<()> {
        self.backend.create_index(ctx, config).await
    }

    async fn delete_index(&self, ctx: &Context, name: &str) -> Result<()> {
        self.backend.delete_index(ctx, name).await
    }

    async fn index_exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        self.backend.index_exists(ctx, name).await
    }
}
