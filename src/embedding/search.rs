//! Brute-force similarity search over the embedding store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::store::{EmbeddingStore, StoreError};
use crate::embedding::vector::{cosine_similarity, l2_norm, SimilarityError};
use crate::extract::{ExtractError, FaceExtractor};
use crate::frames;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("no faces found in the image")]
    NoFaceDetected,

    #[error("no matching faces found")]
    NoMatches,

    #[error("query vector has zero norm")]
    DegenerateQuery,

    #[error("failed to decode query image: {0}")]
    Decode(String),

    #[error("extractor error: {0}")]
    Extract(#[from] ExtractError),

    #[error("similarity error: {0}")]
    Similarity(#[from] SimilarityError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// One ranked search hit, already joined with its owning media item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMatch {
    pub media_id: u64,
    pub embedding_id: u64,
    /// Cosine score scaled to a percentage, two decimals.
    pub similarity: f64,
    pub filename: String,
    pub path: String,
}

/// Stateless read path: scans a store snapshot, never mutates it.
pub struct SearchEngine {
    store: Arc<EmbeddingStore>,
    default_threshold: f64,
}

impl SearchEngine {
    pub fn new(store: Arc<EmbeddingStore>, default_threshold: f64) -> Self {
        Self {
            store,
            default_threshold,
        }
    }

    /// Find media containing a face similar to the supplied query image.
    ///
    /// Extracts the first detected face from the image bytes, then ranks
    /// the store against it.
    pub fn search_image(
        &self,
        extractor: &dyn FaceExtractor,
        image_bytes: &[u8],
        threshold: Option<f64>,
    ) -> Result<Vec<FaceMatch>, SearchError> {
        let frame =
            frames::decode_image(image_bytes).map_err(|err| SearchError::Decode(err.to_string()))?;

        let vectors = extractor.extract(&frame)?;
        let query = vectors.into_iter().next().ok_or(SearchError::NoFaceDetected)?;

        self.search(&query, threshold)
    }

    /// Rank every stored embedding against the query vector.
    ///
    /// Scores below the threshold are dropped; survivors are sorted by
    /// score descending (stable, so ties keep insertion order) and
    /// collapsed to the best-scoring embedding per media item.
    pub fn search(
        &self,
        query: &[f64],
        threshold: Option<f64>,
    ) -> Result<Vec<FaceMatch>, SearchError> {
        if l2_norm(query) < f64::EPSILON {
            return Err(SearchError::DegenerateQuery);
        }

        let threshold = threshold.unwrap_or(self.default_threshold);
        let snapshot = self.store.all_embeddings();

        let mut scored: Vec<(u64, u64, f64)> = Vec::new();
        for embedding in &snapshot {
            let score = match cosine_similarity(query, &embedding.vector) {
                Ok(score) => score,
                // a degenerate stored row can never match anything
                Err(SimilarityError::DegenerateVector) => {
                    log::warn!("skipping zero-norm embedding {}", embedding.id);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if score >= threshold {
                scored.push((embedding.media_id, embedding.id, score));
            }
        }

        if scored.is_empty() {
            return Err(SearchError::NoMatches);
        }

        // stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        // best embedding per media item only
        let mut seen = HashSet::new();
        scored.retain(|(media_id, _, _)| seen.insert(*media_id));

        let media_ids: Vec<u64> = scored.iter().map(|(media_id, _, _)| *media_id).collect();
        let media_map: HashMap<u64, crate::media::MediaItem> = self
            .store
            .media_by_ids(&media_ids)
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let matches = scored
            .into_iter()
            .filter_map(|(media_id, embedding_id, score)| {
                let media = media_map.get(&media_id)?;
                Some(FaceMatch {
                    media_id,
                    embedding_id,
                    similarity: to_percent(score),
                    filename: media.filename.clone(),
                    path: media.path.clone(),
                })
            })
            .collect::<Vec<_>>();

        if matches.is_empty() {
            return Err(SearchError::NoMatches);
        }

        Ok(matches)
    }
}

/// Scale a cosine score to a percentage with two decimals.
fn to_percent(score: f64) -> f64 {
    (score * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_percent_rounds_to_two_decimals() {
        assert_eq!(to_percent(0.92), 92.0);
        assert_eq!(to_percent(0.65), 65.0);
        assert_eq!(to_percent(0.123456), 12.35);
    }
}
