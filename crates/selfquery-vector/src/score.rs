//! Backend-agnostic post-processing of raw hits.

use std::cmp::Ordering;

use selfquery_core::{DistanceMetric, ScoredDocument};

/// Keep hits scoring at least `threshold`, order best first (ties by
/// ascending id) and cut to `k`.
pub fn rank(mut hits: Vec<ScoredDocument>, threshold: Option<f32>, k: usize) -> Vec<ScoredDocument> {
    hits.retain(|h| !h.score.is_nan());
    if let Some(t) = threshold {
        hits.retain(|h| h.score >= t);
    }
    hits.sort_by(compare);
    hits.truncate(k);
    hits
}

/// Descending score, then ascending document id.
pub fn compare(a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.document.id.as_deref().unwrap_or("").cmp(b.document.id.as_deref().unwrap_or("")))
}

/// Turn a raw distance into the similarity scale this crate reports.
pub fn similarity_from_distance(metric: DistanceMetric, distance: f32) -> f32 {
    match metric {
        // Lance reports dot distance as `1 - a.b`.
        DistanceMetric::Cosine | DistanceMetric::Dot => 1.0 - distance,
        // Squared L2.
        DistanceMetric::Euclidean => 1.0 / (1.0 + distance.max(0.0).sqrt()),
    }
}

/// Exact similarity between two vectors, on the same scale as
/// [`similarity_from_distance`].
pub fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    match metric {
        DistanceMetric::Cosine => {
            let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if na == 0.0 || nb == 0.0 {
                0.0
            } else {
                dot / (na * nb)
            }
        }
        DistanceMetric::Euclidean => {
            let sq: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
            1.0 / (1.0 + sq.sqrt())
        }
        DistanceMetric::Dot => dot,
    }
}
