//! OpenAI-compatible embeddings and chat completions.
//!
//! Any server speaking the `/embeddings` and `/chat/completions` shapes works,
//! including Azure OpenAI deployments fronted by a compatible gateway.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use selfquery_core::{Context, Embedder, Error, LanguageModel, Result};

use selfquery_core::http;

const SERVICE: &str = "openai";

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Requested output width; also the width every response must have.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default)]
    pub temperature: f32,
    /// Inputs per request; larger batches are split.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_dimensions() -> usize {
    1536
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_batch() -> usize {
    2048
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            embedding_model: default_embedding_model(),
            dimensions: default_dimensions(),
            chat_model: default_chat_model(),
            temperature: 0.0,
            max_batch: default_max_batch(),
        }
    }
}

impl OpenAiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(key.into()));
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiConfig,
    id: String,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: OpenAiConfig) -> Self {
        let id = format!("openai:{}", config.embedding_model);
        Self { client, config, id }
    }

    async fn embed_chunk(&self, ctx: &Context, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest { model: &self.config.embedding_model, input: texts, encoding_format: "float" };
        let request = self.config.authorize(self.client.post(self.config.endpoint("embeddings")).json(&body));
        let response: EmbeddingResponse = http::send_json(ctx, SERVICE, request).await?;

        if response.data.len() != texts.len() {
            return Err(Error::Embedding {
                reason: format!("requested {} embeddings, received {}", texts.len(), response.data.len()),
            });
        }
        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        for item in &data {
            if item.embedding.len() != self.config.dimensions {
                return Err(Error::DimensionMismatch {
                    expected: self.config.dimensions,
                    actual: item.embedding.len(),
                });
            }
        }
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.config.dimensions
    }

    async fn embed_batch(&self, ctx: &Context, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.max_batch.max(1)) {
            out.extend(self.embed_chunk(ctx, chunk).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChatModel {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_id(&self) -> &str {
        &self.config.chat_model
    }

    async fn complete(&self, ctx: &Context, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.chat_model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.config.temperature,
        };
        let request = self.config.authorize(self.client.post(self.config.endpoint("chat/completions")).json(&body));
        let response: ChatResponse = http::send_json(ctx, SERVICE, request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::BackendRequest {
                service: SERVICE.to_string(),
                status: None,
                message: "completion response had no content".to_string(),
                source: None,
            })
    }
}
