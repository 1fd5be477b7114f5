//! Cross-module tests. Each test builds its stack in a unique temp
//! directory so parallel tests never collide and no real data is touched.

mod search;
mod store;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::Config;
use crate::embedding::EmbeddingStore;
use crate::extract::{DecodedFrame, ExtractError, FaceExtractor};
use crate::ingest::Ingestor;
use crate::media;
use crate::storage;

pub const TEST_EXTRACTOR_ID: [u8; 32] = [7u8; 32];

/// Scripted extractor: each `extract` call pops the next canned response,
/// returning no faces once the script runs out.
pub struct FakeExtractor {
    dimensions: usize,
    responses: Mutex<VecDeque<Vec<Vec<f64>>>>,
}

impl FakeExtractor {
    pub fn new(dimensions: usize, responses: Vec<Vec<Vec<f64>>>) -> Self {
        Self {
            dimensions,
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn empty(dimensions: usize) -> Self {
        Self::new(dimensions, vec![])
    }
}

impl FaceExtractor for FakeExtractor {
    fn extract(&self, _frame: &DecodedFrame) -> Result<Vec<Vec<f64>>, ExtractError> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn id_hash(&self) -> [u8; 32] {
        TEST_EXTRACTOR_ID
    }
}

/// Extractor that always fails, for pipeline error-absorption tests.
pub struct FailingExtractor {
    dimensions: usize,
}

impl FailingExtractor {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl FaceExtractor for FailingExtractor {
    fn extract(&self, _frame: &DecodedFrame) -> Result<Vec<Vec<f64>>, ExtractError> {
        Err(ExtractError::Process {
            status: "exit status: 1".into(),
            stderr: "model exploded".into(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn id_hash(&self) -> [u8; 32] {
        TEST_EXTRACTOR_ID
    }
}

pub fn create_store(dimensions: usize) -> (Arc<EmbeddingStore>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");

    let media_mgr = Arc::new(
        media::BackendCsv::load(tmp.path().join("media.csv").to_str().unwrap())
            .expect("failed to create media csv"),
    );

    let store = EmbeddingStore::open(
        media_mgr,
        tmp.path().join("vectors.bin"),
        TEST_EXTRACTOR_ID,
        dimensions,
    )
    .expect("failed to open store");

    (Arc::new(store), tmp)
}

pub fn create_ingestor(
    extractor: Arc<dyn FaceExtractor>,
) -> (Ingestor, Arc<EmbeddingStore>, tempfile::TempDir) {
    let (store, tmp) = create_store(extractor.dimensions());

    let storage_mgr = Arc::new(
        storage::BackendLocal::new(tmp.path().join("uploads").to_str().unwrap())
            .expect("failed to create storage"),
    );

    let config = Arc::new(RwLock::new(Config::load_with(tmp.path().to_str().unwrap())));

    let ingestor = Ingestor::new(store.clone(), storage_mgr, extractor, config);
    (ingestor, store, tmp)
}

/// Tiny valid PNG for paths that decode real image bytes.
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(4, 4, image::Rgb([100, 150, 200]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
