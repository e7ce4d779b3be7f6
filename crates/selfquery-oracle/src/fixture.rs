//! Pinned oracles: recorded embeddings and canned completions.
//!
//! Retrieval assertions are only reproducible when both oracles are fixed.
//! Real services drift between releases, so integration tests load vectors
//! recorded once and replay scripted completions instead.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use selfquery_core::{Context, Embedder, Error, LanguageModel, Result};

#[derive(Debug, Deserialize)]
struct FixtureFile {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

/// Embedder backed by a text → vector table.
///
/// Looking up text that was never recorded is an error, so a test cannot
/// silently fall back to some other vector.
pub struct FixtureEmbedder {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
    id: String,
}

impl FixtureEmbedder {
    pub fn new(dim: usize, vectors: HashMap<String, Vec<f32>>) -> Result<Self> {
        if let Some((text, v)) = vectors.iter().find(|(_, v)| v.len() != dim) {
            return Err(Error::InvalidConfig(format!(
                "fixture vector for {text:?} has {} components, expected {dim}",
                v.len()
            )));
        }
        Ok(Self { dim, vectors, id: format!("fixture:d{dim}") })
    }

    /// Load `{"dim": N, "vectors": {"text": [..], ..}}` from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("Failed to read fixture {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: FixtureFile =
            serde_json::from_str(raw).map_err(|e| Error::InvalidConfig(format!("Invalid fixture file: {e}")))?;
        Self::new(file.dim, file.vectors)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

#[async_trait]
impl Embedder for FixtureEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, ctx: &Context, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        ctx.check()?;
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| Error::Embedding { reason: format!("no recorded vector for {t:?}") })
            })
            .collect()
    }
}

/// Completion model that replays scripted responses in order.
///
/// With a single response constructed through [`ScriptedModel::always`], that
/// response is returned for every prompt. Prompts are recorded for inspection.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: impl Into<String>) -> Self {
        Self { responses: Mutex::new(VecDeque::new()), repeat: Some(response.into()), prompts: Mutex::new(Vec::new()) }
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, ctx: &Context, prompt: &str) -> Result<String> {
        ctx.check()?;
        self.prompts.lock().push(prompt.to_string());
        if let Some(next) = self.responses.lock().pop_front() {
            return Ok(next);
        }
        self.repeat
            .clone()
            .ok_or_else(|| Error::InvalidConfig("scripted model ran out of responses".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_text_is_an_error() {
        let e = FixtureEmbedder::from_json(r#"{"dim": 2, "vectors": {"tokyo": [0.9, 0.436]}}"#).unwrap();
        let ctx = Context::new();
        let hit = e.embed_query(&ctx, "tokyo").await.unwrap();
        assert_eq!(hit, vec![0.9, 0.436]);
        let miss = e.embed_query(&ctx, "kyoto").await;
        assert!(matches!(miss, Err(Error::Embedding { .. })));
    }

    #[test]
    fn wrong_width_is_rejected() {
        let out = FixtureEmbedder::from_json(r#"{"dim": 3, "vectors": {"a": [1.0, 0.0]}}"#);
        assert!(matches!(out, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn scripted_model_replays_then_fails() {
        let m = ScriptedModel::new(["first", "second"]);
        let ctx = Context::new();
        assert_eq!(m.complete(&ctx, "p1").await.unwrap(), "first");
        assert_eq!(m.complete(&ctx, "p2").await.unwrap(), "second");
        assert!(m.complete(&ctx, "p3").await.is_err());
        assert_eq!(m.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn always_repeats() {
        let m = ScriptedModel::always("same");
        let ctx = Context::new();
        for _ in 0..3 {
            assert_eq!(m.complete(&ctx, "q").await.unwrap(), "same");
        }
    }
}
