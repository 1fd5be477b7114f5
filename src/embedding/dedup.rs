//! Near-duplicate suppression within one ingestion batch.

use crate::embedding::vector::{cosine_similarity, SimilarityError};

/// Accumulates the vectors accepted for a single media item's ingestion.
///
/// Deduplication is deliberately scoped to one batch: the same face
/// appearing in two separate uploads is stored twice. Merging across the
/// historical store would change result counts and is out of scope.
pub struct DedupBatch {
    accepted: Vec<Vec<f64>>,
    threshold: f64,
}

impl DedupBatch {
    pub fn new(threshold: f64) -> Self {
        Self {
            accepted: Vec::new(),
            threshold,
        }
    }

    /// Offer a candidate vector to the batch.
    ///
    /// Returns true when the candidate was accepted, false when it scored
    /// at or above the threshold against something already accepted.
    pub fn push(&mut self, candidate: Vec<f64>) -> Result<bool, SimilarityError> {
        for kept in &self.accepted {
            let score = cosine_similarity(&candidate, kept)?;
            if score >= self.threshold {
                return Ok(false);
            }
        }

        self.accepted.push(candidate);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn into_vectors(self) -> Vec<Vec<f64>> {
        self.accepted
    }
}
