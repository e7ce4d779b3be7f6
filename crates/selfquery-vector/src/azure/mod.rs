//! Azure AI Search backend over its REST API.
//!
//! Namespaces share one index and are separated by a filterable `namespace`
//! field. Scores are the service's own `@search.score`; for cosine indexes that
//! is `1 / (1 + cosine_distance)`, so it stays in `(0.5, 1]` for non-negative
//! similarity.

pub mod documents;
pub mod index;
pub mod odata;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use selfquery_core::{Context, Error, FilterExpression, IndexConfig, IndexManager, Result, ScoredDocument};
use selfquery_core::http;

use self::documents::{IndexingResponse, SearchResponse};
use crate::backend::{Backend, EmbeddedDocument};

const SERVICE: &str = "azure-search";

#[derive(Debug, Clone, Deserialize)]
pub struct AzureSearchConfig {
    /// `https://<service>.search.windows.net`
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_api_version() -> String {
    "2023-11-01".to_string()
}

impl AzureSearchConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), api_key: None, api_version: default_api_version() }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(key.into()));
        self
    }
}

pub struct AzureSearchBackend {
    client: Client,
    config: AzureSearchConfig,
}

impl AzureSearchBackend {
    pub fn new(config: AzureSearchConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: AzureSearchConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, method: Method, index: &str, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/indexes/{index}{path}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.api_version
        );
        let request = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) => request.header("api-key", key.expose_secret()),
            None => request,
        }
    }
}

/// A 404 from an index-scoped call means the index is missing.
fn index_not_found(name: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |e| match e {
        Error::BackendRequest { status: Some(404), .. } => Error::IndexNotFound { name: name.to_string() },
        other => other,
    }
}

#[async_trait]
impl IndexManager for AzureSearchBackend {
    /// `PUT` semantics: an existing index with a compatible definition is overwritten.
    async fn create_index(&self, ctx: &Context, config: &IndexConfig) -> Result<()> {
        config.validate()?;
        let request = self.request(Method::PUT, &config.name, "").json(&index::index_definition(config));
        http::send(ctx, SERVICE, request).await?;
        tracing::info!(index = %config.name, dim = config.vector_dimension, metric = config.distance_metric.as_str(), "azure index created");
        Ok(())
    }

    async fn delete_index(&self, ctx: &Context, name: &str) -> Result<()> {
        http::send(ctx, SERVICE, self.request(Method::DELETE, name, ""))
            .await
            .map_err(index_not_found(name))?;
        tracing::info!(index = name, "azure index deleted");
        Ok(())
    }

    async fn index_exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        match http::send(ctx, SERVICE, self.request(Method::GET, name, "")).await {
            Ok(_) => Ok(true),
            Err(Error::BackendRequest { status: Some(404), .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Backend for AzureSearchBackend {
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
        let body = documents::upload_body(config, namespace, &rows);
        let request = self.request(Method::POST, &config.name, "/docs/index").json(&body);
        let response: IndexingResponse = http::send_json(ctx, SERVICE, request)
            .await
            .map_err(index_not_found(&config.name))?;
        let failures = documents::failures(&rows, &response);
        if failures.is_empty() {
            Ok(())
        } else {
            tracing::warn!(index = %config.name, failed = failures.len(), total = rows.len(), "azure rejected part of a batch");
            Err(Error::PartialBatchFailure { failures })
        }
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
        let filter = odata::build_filter(namespace, filter)?;
        let body = documents::search_body(vector, k, &filter);
        let request = self.request(Method::POST, &config.name, "/docs/search").json(&body);
        let response: SearchResponse = http::send_json(ctx, SERVICE, request)
            .await
            .map_err(index_not_found(&config.name))?;
        Ok(response.value.into_iter().map(documents::SearchHit::into_scored).collect())
    }
}
