//! Embedding and completion oracles.
//!
//! `hash` and `fixture` run fully offline; `openai` talks to any
//! OpenAI-compatible endpoint. [`build_embedder`] and [`build_model`] turn
//! configuration into trait objects.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use selfquery_core::config::expand_path;
use selfquery_core::{Embedder, LanguageModel, Result};

pub mod fixture;
pub mod hash;
pub mod openai;

pub use fixture::{FixtureEmbedder, ScriptedModel};
pub use hash::HashEmbedder;
pub use openai::{OpenAiChatModel, OpenAiConfig, OpenAiEmbedder};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbedderSettings {
    Hash {
        #[serde(default = "default_hash_dim")]
        dim: usize,
    },
    Fixture {
        path: PathBuf,
    },
    OpenAi(OpenAiConfig),
}

fn default_hash_dim() -> usize {
    1536
}

impl EmbedderSettings {
    fn into_fake(self) -> Self {
        match self {
            Self::OpenAi(cfg) => Self::Hash { dim: cfg.dimensions },
            Self::Fixture { .. } => Self::Hash { dim: default_hash_dim() },
            hash @ Self::Hash { .. } => hash,
        }
    }
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self::Hash { dim: default_hash_dim() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ModelSettings {
    Scripted { responses: Vec<String> },
    OpenAi(OpenAiConfig),
}

/// Build the configured embedder.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` swaps any configured provider for a
/// [`HashEmbedder`] of the same width.
pub fn build_embedder(settings: EmbedderSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    let settings = if use_fake { settings.into_fake() } else { settings };

    let embedder: Arc<dyn Embedder> = match settings {
        EmbedderSettings::Hash { dim } => Arc::new(HashEmbedder::new(dim)),
        EmbedderSettings::Fixture { path } => {
            let path = expand_path(path.to_string_lossy());
            Arc::new(FixtureEmbedder::from_path(&path)?)
        }
        EmbedderSettings::OpenAi(cfg) => Arc::new(OpenAiEmbedder::new(cfg)),
    };
    tracing::info!(embedder = embedder.embedder_id(), dim = embedder.dim(), "embedder ready");
    Ok(embedder)
}

pub fn build_model(settings: ModelSettings) -> Arc<dyn LanguageModel> {
    let model: Arc<dyn LanguageModel> = match settings {
        ModelSettings::Scripted { responses } => Arc::new(ScriptedModel::new(responses)),
        ModelSettings::OpenAi(cfg) => Arc::new(OpenAiChatModel::new(cfg)),
    };
    tracing::info!(model = model.model_id(), "language model ready");
    model
}
