//! Cosine similarity and softmax ranking over embedding vectors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimilarityError {
    #[error("embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Normalised dot product. Zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch { left: a.len(), right: b.len() });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    Ok(if denom == 0.0 { 0.0 } else { dot / denom })
}

/// Softmax with the max subtracted first so large logits don't overflow.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let Some(max) = scores.iter().copied().reduce(f32::max) else {
        return Vec::new();
    };

    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// One probability per candidate, in input order.
    pub probabilities: Vec<f32>,
    /// Index of the highest probability; `None` for no candidates.
    pub best: Option<usize>,
}

impl Ranking {
    pub fn best_probability(&self) -> Option<f32> {
        self.best.map(|i| self.probabilities[i])
    }
}

/// Rank `candidates` against `query`: cosine similarity, scaled by
/// `logit_scale`, softmaxed.
pub fn rank(
    query: &[f32],
    candidates: &[Vec<f32>],
    logit_scale: f32,
) -> Result<Ranking, SimilarityError> {
    let logits = candidates
        .iter()
        .map(|c| cosine_similarity(query, c).map(|s| s * logit_scale))
        .collect::<Result<Vec<_>, _>>()?;

    let probabilities = softmax(&logits);
    let best = probabilities
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i);

    Ok(Ranking { probabilities, best })
}
