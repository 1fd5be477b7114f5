//! Embedding records and the cosine similarity metric.

use serde::{Deserialize, Serialize};

/// One persisted face embedding.
///
/// Immutable once persisted; `media_id` always references an existing
/// media item (enforced by the store at append time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub id: u64,
    pub media_id: u64,
    pub vector: Vec<f64>,
}

/// Errors from vector comparisons.
#[derive(Debug, thiserror::Error)]
pub enum SimilarityError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot compare a zero-norm vector")]
    DegenerateVector,
}

/// Cosine similarity of two vectors, in [-1, 1].
///
/// Zero-norm input is an error rather than a silent 0.0; callers pick
/// their own fallback policy.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f64::EPSILON || norm_b < f64::EPSILON {
        return Err(SimilarityError::DegenerateVector);
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Ok(dot / (norm_a * norm_b))
}

pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_similarity_is_one() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        let score = cosine_similarity(&v, &v).unwrap();
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetry() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-0.5, 0.25, 8.0];
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_orthogonal_vectors_score_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let score = cosine_similarity(&a, &b).unwrap();
        assert!(score.abs() < 1e-12);
    }

    #[test]
    fn test_opposite_vectors_score_negative_one() {
        let a = vec![2.0, 0.0, 0.0];
        let b = vec![-3.0, 0.0, 0.0];
        let score = cosine_similarity(&a, &b).unwrap();
        assert!((score + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0];
        let result = cosine_similarity(&a, &b);
        assert!(matches!(
            result,
            Err(SimilarityError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_zero_norm_is_an_error() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(SimilarityError::DegenerateVector)
        ));
        assert!(matches!(
            cosine_similarity(&b, &a),
            Err(SimilarityError::DegenerateVector)
        ));
    }
}
