use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    sync::{Arc, RwLock},
    time::Instant,
};

/// One uploaded image or video.
///
/// `processed` flips to true exactly once, after every surviving embedding
/// for the item has been persisted. Items are never deleted by this core.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: u64,

    pub filename: String,
    /// Storage ident of the uploaded file under the uploads backend.
    pub path: String,

    pub processed: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MediaCreate {
    pub filename: String,
    pub path: String,
}

pub trait MediaManager: Send + Sync {
    fn create(&self, media: MediaCreate) -> anyhow::Result<MediaItem>;
    fn get(&self, id: u64) -> Option<MediaItem>;
    fn by_ids(&self, ids: &[u64]) -> Vec<MediaItem>;
    fn all(&self) -> Vec<MediaItem>;
    /// Idempotent Pending -> Processed transition.
    /// Returns false when the id is unknown.
    fn mark_processed(&self, id: u64) -> anyhow::Result<bool>;
}

/// CSV-backed media table, fully in memory with a durable rewrite on every
/// mutation.
#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<MediaItem>>>,
    path: String,
}

const CSV_HEADERS: [&str; 4] = ["id", "filename", "path", "processed"];

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new media table at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;
        let iter = csv_reader.records();

        let mut items = vec![];
        for record in iter {
            let record = record?;
            let id = record
                .get(0)
                .ok_or(anyhow!("couldnt get record id"))?
                .parse::<u64>()?;
            let filename = record
                .get(1)
                .ok_or(anyhow!("couldnt get record filename"))?
                .to_string();
            let file_path = record
                .get(2)
                .ok_or(anyhow!("couldnt get record path"))?
                .to_string();
            let processed = record
                .get(3)
                .ok_or(anyhow!("couldnt get record processed"))?
                == "1";

            items.push(MediaItem {
                id,
                filename,
                path: file_path,
                processed,
            });
        }

        log::debug!(
            "took {}ms to read media csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(items)),
            path: path.to_string(),
        })
    }

    fn save(&self, items: &[MediaItem]) -> anyhow::Result<()> {
        let temp_path = format!("{}-tmp", &self.path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for item in items {
            let id = item.id.to_string();
            csv_wrt.write_record([
                id.as_str(),
                item.filename.as_str(),
                item.path.as_str(),
                if item.processed { "1" } else { "0" },
            ])?;
        }
        csv_wrt.flush()?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl MediaManager for BackendCsv {
    fn create(&self, media: MediaCreate) -> anyhow::Result<MediaItem> {
        let mut items = self.list.write().unwrap();

        // ids are monotonic, 1-based
        let id = items.last().map(|item| item.id + 1).unwrap_or(1);

        let item = MediaItem {
            id,
            filename: media.filename,
            path: media.path,
            processed: false,
        };

        items.push(item.clone());
        self.save(&items)?;

        Ok(item)
    }

    fn get(&self, id: u64) -> Option<MediaItem> {
        self.list
            .read()
            .unwrap()
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    fn by_ids(&self, ids: &[u64]) -> Vec<MediaItem> {
        self.list
            .read()
            .unwrap()
            .iter()
            .filter(|item| ids.contains(&item.id))
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<MediaItem> {
        self.list.read().unwrap().clone()
    }

    fn mark_processed(&self, id: u64) -> anyhow::Result<bool> {
        let mut items = self.list.write().unwrap();

        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            return Ok(false);
        };

        if !item.processed {
            item.processed = true;
            self.save(&items)?;
        }

        Ok(true)
    }
}
