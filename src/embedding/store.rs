//! The authoritative, concurrency-safe embedding repository.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::embedding::persist::{EmbeddingFile, EmbeddingFileError};
use crate::embedding::vector::Embedding;
use crate::media::{MediaCreate, MediaItem, MediaManager};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("media item not found")]
    NotFound,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Persistence error: {0}")]
    Persist(#[from] EmbeddingFileError),

    #[error("Media table error: {0:?}")]
    Media(#[from] anyhow::Error),
}

struct StoreInner {
    embeddings: Vec<Embedding>,
    next_id: u64,
}

/// Owns the embedding table and drives media status transitions.
///
/// Appends take the single write lock for the whole
/// validate-assign-push-persist sequence, so concurrent ingestion workers
/// are linearized and readers never observe a half-applied append.
pub struct EmbeddingStore {
    media_mgr: Arc<dyn MediaManager>,
    inner: RwLock<StoreInner>,
    file: EmbeddingFile,
    extractor_id: [u8; 32],
    dimensions: usize,
}

impl EmbeddingStore {
    /// Open the store, loading vectors.bin when present.
    ///
    /// The file must have been written by the same extractor with the same
    /// dimensions; anything else is refused rather than silently mixed.
    pub fn open(
        media_mgr: Arc<dyn MediaManager>,
        vectors_path: PathBuf,
        extractor_id: [u8; 32],
        dimensions: usize,
    ) -> Result<Self, StoreError> {
        let file = EmbeddingFile::new(vectors_path);

        let embeddings = if file.exists() {
            file.load(&extractor_id, dimensions)?
        } else {
            Vec::new()
        };

        let next_id = embeddings.iter().map(|e| e.id).max().unwrap_or(0) + 1;

        Ok(Self {
            media_mgr,
            inner: RwLock::new(StoreInner {
                embeddings,
                next_id,
            }),
            file,
            extractor_id,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Allocate a new media item in Pending state.
    pub fn create_media(&self, filename: &str, path: &str) -> Result<MediaItem, StoreError> {
        let item = self.media_mgr.create(MediaCreate {
            filename: filename.to_string(),
            path: path.to_string(),
        })?;
        Ok(item)
    }

    pub fn media(&self, id: u64) -> Result<MediaItem, StoreError> {
        self.media_mgr.get(id).ok_or(StoreError::NotFound)
    }

    pub fn media_by_ids(&self, ids: &[u64]) -> Vec<MediaItem> {
        self.media_mgr.by_ids(ids)
    }

    pub fn media_all(&self) -> Vec<MediaItem> {
        self.media_mgr.all()
    }

    /// Idempotent Pending -> Processed transition.
    pub fn mark_processed(&self, media_id: u64) -> Result<(), StoreError> {
        if !self.media_mgr.mark_processed(media_id)? {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Persist one embedding and return its fresh id.
    ///
    /// Fails with `NotFound` when `media_id` is unknown and with
    /// `DimensionMismatch` when the vector does not match the store's
    /// dimensionality. Durable before it returns.
    pub fn append(&self, vector: Vec<f64>, media_id: u64) -> Result<u64, StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        if self.media_mgr.get(media_id).is_none() {
            return Err(StoreError::NotFound);
        }

        let mut inner = self.inner.write().unwrap();

        let id = inner.next_id;
        inner.embeddings.push(Embedding {
            id,
            media_id,
            vector,
        });

        if let Err(err) = self
            .file
            .save(&inner.embeddings, &self.extractor_id, self.dimensions)
        {
            // keep memory and disk consistent
            inner.embeddings.pop();
            return Err(err.into());
        }

        inner.next_id += 1;

        Ok(id)
    }

    /// Insertion-ordered snapshot of every persisted embedding.
    pub fn all_embeddings(&self) -> Vec<Embedding> {
        self.inner.read().unwrap().embeddings.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
