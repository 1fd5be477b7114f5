//! Face-embedding storage and similarity search.
//!
//! # Architecture
//!
//! - `vector`: embedding records and the cosine similarity metric
//! - `dedup`: per-ingestion-batch near-duplicate suppression
//! - `persist`: binary file I/O for vectors.bin persistence
//! - `store`: concurrency-safe repository of all embeddings
//! - `search`: full-scan ranked similarity search

pub mod dedup;
mod persist;
pub mod search;
pub mod store;
pub mod vector;

pub use dedup::DedupBatch;
pub use persist::{EmbeddingFile, EmbeddingFileError};
pub use search::{FaceMatch, SearchEngine, SearchError};
pub use store::{EmbeddingStore, StoreError};
pub use vector::{cosine_similarity, Embedding, SimilarityError};

/// Embedding dimensionality of the reference extractor.
pub const EMBEDDING_DIM: usize = 128;

/// Vectors scoring at or above this within one ingestion batch are dropped.
pub const DUPLICATE_THRESHOLD: f64 = 0.6;

/// Default minimum score for a search hit.
pub const SEARCH_THRESHOLD: f64 = 0.6;
