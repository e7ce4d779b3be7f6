use std::sync::Arc;

use serde::{Deserialize, Serialize};

use selfquery_core::{
    AttributeInfo, Context, Document, Error, LanguageModel, Result, SearchOptions, StructuredQuery, VectorStore,
};

use crate::translator::{QueryTranslator, TranslatorConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    pub document_contents: String,
    pub metadata_field_info: Vec<AttributeInfo>,
    #[serde(default)]
    pub enable_limit: bool,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Result count when neither the caller nor the model asks for one.
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default)]
    pub search: SearchOptions,
}

fn default_limit() -> usize {
    10
}

fn default_k() -> usize {
    4
}

impl RetrieverConfig {
    pub fn new(document_contents: impl Into<String>, metadata_field_info: Vec<AttributeInfo>) -> Self {
        Self {
            document_contents: document_contents.into(),
            metadata_field_info,
            enable_limit: false,
            default_limit: default_limit(),
            default_k: default_k(),
            search: SearchOptions::default(),
        }
    }

    pub fn with_limit(mut self, enable: bool, default_limit: usize) -> Self {
        self.enable_limit = enable;
        self.default_limit = default_limit;
        self
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    pub fn with_search(mut self, search: SearchOptions) -> Self {
        self.search = search;
        self
    }

    fn translator_config(&self) -> TranslatorConfig {
        TranslatorConfig::new(self.document_contents.clone(), self.metadata_field_info.clone())
            .with_limit(self.enable_limit, self.default_limit)
    }
}

/// Natural-language query in, ranked documents out: translate, then run a
/// filtered similarity search against the store.
pub struct Retriever {
    translator: QueryTranslator,
    store: Arc<dyn VectorStore>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(model: Arc<dyn LanguageModel>, store: Arc<dyn VectorStore>, config: RetrieverConfig) -> Result<Self> {
        if config.default_k == 0 {
            return Err(Error::InvalidK { k: 0 });
        }
        let translator = QueryTranslator::new(model, config.translator_config())?;
        Ok(Self { translator, store, config })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Only the translation step.
    pub async fn structured_query(&self, ctx: &Context, query: &str) -> Result<StructuredQuery> {
        self.translator.translate(ctx, query).await
    }

    /// Documents relevant to `query`, best first. An explicit `count` beats
    /// the model's limit, which beats `default_k`.
    pub async fn retrieve(&self, ctx: &Context, query: &str, count: Option<usize>) -> Result<Vec<Document>> {
        if count == Some(0) {
            return Err(Error::InvalidK { k: 0 });
        }
        let structured = self.translator.translate(ctx, query).await?;
        let k = count.or(structured.limit).unwrap_or(self.config.default_k);
        let opts = self.config.search.clone().with_max_results(k);
        let hits = self.store.filtered_similarity_search(ctx, &structured, &opts).await?;
        tracing::info!(
            query = %structured.semantic_query,
            filtered = structured.filter.is_some(),
            k,
            hits = hits.len(),
            "retrieved"
        );
        Ok(hits.into_iter().map(|h| h.document).collect())
    }
}
