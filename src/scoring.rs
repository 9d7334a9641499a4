//! Cosine similarity and the 0-100 relevance score derived from it.

use crate::error::{Result, StoreError};
use crate::types::SearchResult;

/// Cosine similarity below which a match is treated as noise
pub const SCORE_FLOOR: f64 = 0.75;

/// Cosine similarity at which the score saturates at 100
pub const SCORE_CEILING: f64 = 0.85;

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(vec_a: &[f32], vec_b: &[f32]) -> Result<f64> {
    if vec_a.len() != vec_b.len() {
        return Err(StoreError::invalid_vector(format!(
            "length mismatch: {} vs {}",
            vec_a.len(),
            vec_b.len()
        )));
    }

    let dot: f64 = vec_a
        .iter()
        .zip(vec_b.iter())
        .map(|(a, b)| *a as f64 * *b as f64)
        .sum();
    let norm_a = norm(vec_a);
    let norm_b = norm(vec_b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(StoreError::invalid_vector("zero-norm vector"));
    }

    Ok(dot / (norm_a * norm_b))
}

/// Relevance score in [0, 100]
///
/// Similarities under [`SCORE_FLOOR`] score 0 and must be dropped by callers,
/// the band up to [`SCORE_CEILING`] maps linearly onto 0..100.
pub fn score(vec_a: &[f32], vec_b: &[f32]) -> Result<f64> {
    Ok(rescale(cosine_similarity(vec_a, vec_b)?))
}

/// Map a raw cosine similarity onto the 0-100 scale
pub fn rescale(similarity: f64) -> f64 {
    if similarity < SCORE_FLOOR {
        return 0.0;
    }
    let scaled = (similarity - SCORE_FLOOR) / (SCORE_CEILING - SCORE_FLOOR) * 100.0;
    scaled.min(100.0)
}

/// Drop zero scores, order by score then most recent update, keep `k`
pub fn rank(results: &mut Vec<SearchResult>, k: usize) {
    results.retain(|r| r.score > 0.0);
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    results.truncate(k);
}

pub(crate) fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

/// Unit-length copy of `v`, or `InvalidVector` for a zero vector
pub(crate) fn normalized(v: &[f32]) -> Result<Vec<f32>> {
    let n = norm(v);
    if n == 0.0 || !n.is_finite() {
        return Err(StoreError::invalid_vector("zero-norm vector"));
    }
    Ok(v.iter().map(|x| (*x as f64 / n) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit vector in the plane with the given cosine against [1, 0]
    fn at_cosine(c: f64) -> Vec<f32> {
        vec![c as f32, (1.0 - c * c).sqrt() as f32]
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-9);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_identical_scores_100_and_orthogonal_scores_0() {
        let a = vec![0.3, 0.4, 0.5];
        assert_eq!(score(&a, &a).unwrap(), 100.0);
        assert_eq!(score(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_band_edges_and_linearity() {
        assert_eq!(rescale(0.75), 0.0);
        assert_eq!(rescale(0.749), 0.0);
        assert!((rescale(0.85) - 100.0).abs() < 1e-9);
        assert_eq!(rescale(0.99), 100.0);
        assert!((rescale(0.80) - 50.0).abs() < 1e-9);
        assert!((rescale(0.775) - 25.0).abs() < 1e-9);

        let s = score(&[1.0, 0.0], &at_cosine(0.8)).unwrap();
        assert!((s - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_vectors() {
        assert!(matches!(
            score(&[0.0, 0.0], &[1.0, 0.0]),
            Err(StoreError::InvalidVector(_))
        ));
        assert!(matches!(
            score(&[1.0], &[1.0, 0.0]),
            Err(StoreError::InvalidVector(_))
        ));
        assert!(normalized(&[0.0; 4]).is_err());
    }
}
