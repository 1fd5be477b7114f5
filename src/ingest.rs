//! Ingestion pipeline: media bytes in, deduplicated embeddings out.
//!
//! Uploads are accepted immediately; per-item processing runs on a
//! throttled background worker pool. Items are independent and processing
//! order across them is not guaranteed.

use std::{
    sync::{
        atomic::{AtomicU16, Ordering},
        mpsc, Arc, RwLock,
    },
    thread::sleep,
    time::Duration,
};

use crate::{
    config::Config,
    embedding::{DedupBatch, EmbeddingStore},
    extract::FaceExtractor,
    frames::{self, MediaKind},
    storage::StorageManager,
};

#[derive(Debug, Clone)]
pub enum Task {
    Process { media_id: u64 },
    Shutdown,
}

fn throttle(counter: Arc<AtomicU16>, config: Arc<RwLock<Config>>) {
    while counter.load(Ordering::Relaxed) >= config.read().unwrap().ingest.max_workers {
        sleep(Duration::from_millis(100));
    }
}

/// Orchestrates uploads end to end and owns the background queue.
pub struct Ingestor {
    store: Arc<EmbeddingStore>,
    storage_mgr: Arc<dyn StorageManager>,
    extractor: Arc<dyn FaceExtractor>,
    config: Arc<RwLock<Config>>,

    task_tx: Option<mpsc::Sender<Task>>,
    queue_handle: Option<std::thread::JoinHandle<()>>,
}

impl Ingestor {
    pub fn new(
        store: Arc<EmbeddingStore>,
        storage_mgr: Arc<dyn StorageManager>,
        extractor: Arc<dyn FaceExtractor>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            store,
            storage_mgr,
            extractor,
            config,
            task_tx: None,
            queue_handle: None,
        }
    }

    /// Start the background worker queue.
    pub fn run_queue(&mut self) {
        let (task_tx, task_rx) = mpsc::channel::<Task>();

        let handle = std::thread::spawn({
            let store = self.store.clone();
            let storage_mgr = self.storage_mgr.clone();
            let extractor = self.extractor.clone();
            let config = self.config.clone();

            move || start_queue(task_rx, store, storage_mgr, extractor, config)
        });

        self.task_tx = Some(task_tx);
        self.queue_handle = Some(handle);
    }

    pub fn shutdown(&self) {
        if let Some(tx) = &self.task_tx {
            let _ = tx.send(Task::Shutdown);
        }
    }

    pub fn wait_queue_finish(&mut self) {
        if let Some(handle) = self.queue_handle.take() {
            let _ = handle.join();
        }
    }

    /// Accept a batch of uploads.
    ///
    /// Stores each blob, allocates a Pending media item, enqueues
    /// processing, and returns the allocated ids immediately. Processing is
    /// fire-and-forget relative to the caller.
    pub fn submit(&self, files: Vec<(String, Vec<u8>)>) -> anyhow::Result<Vec<u64>> {
        let mut media_ids = Vec::with_capacity(files.len());

        for (filename, data) in files {
            let media_id = self.accept(&filename, &data)?;
            media_ids.push(media_id);

            if let Some(tx) = &self.task_tx {
                if let Err(err) = tx.send(Task::Process { media_id }) {
                    log::error!("failed to enqueue media {media_id}: {err:?}");
                }
            }
        }

        Ok(media_ids)
    }

    /// Store the blob and allocate the Pending media item, without
    /// enqueueing. Used by `submit` and by the synchronous CLI path.
    pub fn accept(&self, filename: &str, data: &[u8]) -> anyhow::Result<u64> {
        let ident = format!("{}-{filename}", rusty_ulid::generate_ulid_string());
        self.storage_mgr.write(&ident, data)?;

        let item = self.store.create_media(filename, &ident)?;
        log::info!("accepted media {} ({filename})", item.id);

        Ok(item.id)
    }

    /// One media item's pipeline: read blob, sample frames, extract,
    /// dedup across the whole item, append survivors, mark processed.
    ///
    /// Per-frame decode/extract failures are logged and skipped. Store
    /// failures propagate and leave the item Pending.
    pub fn process_one(&self, media_id: u64) -> anyhow::Result<()> {
        let item = self.store.media(media_id)?;
        let data = self.storage_mgr.read(&item.path)?;

        let stride = self.config.read().unwrap().ingest.frame_stride;
        let frames = match frames::detect_kind(&data) {
            MediaKind::Image => match frames::decode_image(&data) {
                Ok(frame) => vec![frame],
                Err(err) => {
                    log::warn!("media {media_id}: image decode failed, no frames: {err}");
                    vec![]
                }
            },
            MediaKind::Video => match frames::sample_video_frames(&data, stride) {
                Ok(frames) => frames,
                Err(err) => {
                    log::warn!("media {media_id}: video demux failed, no frames: {err}");
                    vec![]
                }
            },
        };

        // one batch across all of this item's frames, so the same face in
        // adjacent frames collapses to one embedding
        let threshold = self.config.read().unwrap().ingest.duplicate_threshold;
        let mut batch = DedupBatch::new(threshold);

        for (idx, frame) in frames.iter().enumerate() {
            let vectors = match self.extractor.extract(frame) {
                Ok(vectors) => vectors,
                Err(err) => {
                    log::warn!("media {media_id}: frame {idx} extraction failed: {err}");
                    continue;
                }
            };

            for vector in vectors {
                match batch.push(vector) {
                    Ok(true) => {}
                    Ok(false) => log::debug!("media {media_id}: frame {idx} dropped a duplicate"),
                    Err(err) => {
                        log::warn!("media {media_id}: frame {idx} skipped a bad vector: {err}")
                    }
                }
            }
        }

        let survivors = batch.into_vectors();
        let count = survivors.len();
        for vector in survivors {
            self.store.append(vector, media_id)?;
        }

        // absence of faces is a valid terminal state
        self.store.mark_processed(media_id)?;
        log::info!("media {media_id}: processed, {count} embeddings persisted");

        Ok(())
    }
}

fn start_queue(
    task_rx: mpsc::Receiver<Task>,
    store: Arc<EmbeddingStore>,
    storage_mgr: Arc<dyn StorageManager>,
    extractor: Arc<dyn FaceExtractor>,
    config: Arc<RwLock<Config>>,
) {
    let thread_ctr = Arc::new(AtomicU16::new(0));

    log::debug!("ingest queue waiting for job");
    while let Ok(task) = task_rx.recv() {
        // graceful shutdown: drain in-flight workers, then stop
        let media_id = match task {
            Task::Shutdown => {
                while thread_ctr.load(Ordering::Relaxed) > 0 {
                    sleep(Duration::from_millis(100));
                }
                return;
            }
            Task::Process { media_id } => media_id,
        };

        throttle(thread_ctr.clone(), config.clone());

        let worker = Ingestor {
            store: store.clone(),
            storage_mgr: storage_mgr.clone(),
            extractor: extractor.clone(),
            config: config.clone(),
            task_tx: None,
            queue_handle: None,
        };

        let thread_counter = thread_ctr.clone();
        thread_counter.fetch_add(1, Ordering::Relaxed);

        let task_handle = std::thread::spawn(move || {
            // no retries: a failed item stays Pending until re-submitted
            if let Err(err) = worker.process_one(media_id) {
                log::error!("media {media_id}: ingestion failed: {err:?}");
            }
        });

        std::thread::spawn({
            let thread_counter = thread_ctr.clone();
            move || {
                if let Err(err) = task_handle.join() {
                    log::error!("ingest worker panicked: {err:?}");
                }
                thread_counter.fetch_sub(1, Ordering::Relaxed);
            }
        });
    }
}
