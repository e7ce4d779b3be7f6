use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use selfquery_core::{Context, Embedder, Result};

/// Deterministic bag-of-words embedder.
///
/// Each lowercased token is hashed into one of `dim` buckets and the result is
/// L2-normalised, so texts sharing words land close together under cosine.
/// No model, no network; meant for offline runs and tests.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hash:xxh64:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in tokens(text).enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % self.dim as u64) as usize;
            #[allow(clippy::cast_precision_loss)]
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            #[allow(clippy::cast_precision_loss)]
            let jitter = (i % 3) as f32 * 0.01;
            v[idx] += val + jitter;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, ctx: &Context, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        ctx.check()?;
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn same_text_same_vector() {
        let e = HashEmbedder::new(64);
        assert_eq!(e.embed_text("Tokyo is big"), e.embed_text("Tokyo is big"));
    }

    #[test]
    fn vectors_are_unit_length() {
        let e = HashEmbedder::new(32);
        let v = e.embed_text("a city in Japan");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let e = HashEmbedder::new(128);
        assert_eq!(e.embed_text("Tokyo, Japan!"), e.embed_text("tokyo japan"));
    }

    #[test]
    fn shared_words_score_higher() {
        let e = HashEmbedder::new(256);
        let q = e.embed_text("tokyo japan");
        let near = e.embed_text("tokyo");
        let far = e.embed_text("potato");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let e = HashEmbedder::new(16);
        let texts = vec!["one".to_string(), "two".to_string()];
        let out = e.embed_batch(&Context::new(), &texts).await.unwrap();
        assert_eq!(out[0], e.embed_text("one"));
        assert_eq!(out[1], e.embed_text("two"));
        assert_eq!(e.embedder_id(), "hash:xxh64:d16");
    }
}
