use crate::embedding::{DUPLICATE_THRESHOLD, EMBEDDING_DIM, SEARCH_THRESHOLD};
use crate::storage::{self, StorageManager};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_WORKERS: u16 = 4;
/// Sample every Nth video frame.
const DEFAULT_FRAME_STRIDE: u32 = 5;
const DEFAULT_EXTRACTOR_COMMAND: &str = "face-extractor";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

pub static DEFAULT_BASE_PATH: Lazy<String> = Lazy::new(|| {
    std::env::var("FACEDEX_BASE_PATH").unwrap_or(format!(
        "{}/.local/share/facedex",
        homedir::my_home()
            .expect("couldnt find home dir")
            .expect("couldnt find home dir")
            .to_string_lossy()
    ))
});

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Upper bound on concurrent ingestion workers
    #[serde(default = "default_max_workers")]
    pub max_workers: u16,

    #[serde(default = "default_frame_stride")]
    pub frame_stride: u32,

    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            frame_stride: DEFAULT_FRAME_STRIDE,
            duplicate_threshold: DUPLICATE_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_threshold")]
    pub threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: SEARCH_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// External extractor command; PNG on stdin, JSON vectors on stdout
    #[serde(default = "default_extractor_command")]
    pub command: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_EXTRACTOR_COMMAND.to_string(),
            dimensions: EMBEDDING_DIM,
        }
    }
}

fn default_max_workers() -> u16 {
    DEFAULT_MAX_WORKERS
}

fn default_frame_stride() -> u32 {
    DEFAULT_FRAME_STRIDE
}

fn default_duplicate_threshold() -> f64 {
    DUPLICATE_THRESHOLD
}

fn default_search_threshold() -> f64 {
    SEARCH_THRESHOLD
}

fn default_extractor_command() -> String {
    DEFAULT_EXTRACTOR_COMMAND.to_string()
}

fn default_dimensions() -> usize {
    EMBEDDING_DIM
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    fn validate(&mut self) {
        if self.ingest.max_workers == 0 {
            self.ingest.max_workers = 1;
        }
        if self.ingest.frame_stride == 0 {
            self.ingest.frame_stride = 1;
        }

        if !(-1.0..=1.0).contains(&self.ingest.duplicate_threshold) {
            panic!(
                "ingest.duplicate_threshold must be between -1.0 and 1.0, got {}",
                self.ingest.duplicate_threshold
            );
        }
        if !(-1.0..=1.0).contains(&self.search.threshold) {
            panic!(
                "search.threshold must be between -1.0 and 1.0, got {}",
                self.search.threshold
            );
        }

        if self.extractor.dimensions == 0 {
            panic!("extractor.dimensions must be greater than 0");
        }
        if self.extractor.command.trim().is_empty() {
            panic!("extractor.command must not be empty");
        }
    }

    pub fn load() -> Self {
        Self::load_with(&DEFAULT_BASE_PATH)
    }

    pub fn load_with(base_path: &str) -> Self {
        let store =
            storage::BackendLocal::new(base_path).expect("failed to create config directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("failed to write default config");
        }

        let config_str = String::from_utf8(
            store.read("config.yaml").expect("failed to read config"),
        )
        .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store =
            storage::BackendLocal::new(&self.base_path).expect("failed to create config directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("failed to write config");
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn uploads_dir(&self) -> String {
        format!("{}/uploads", self.base_path)
    }

    pub fn media_csv_path(&self) -> String {
        format!("{}/media.csv", self.base_path)
    }

    pub fn vectors_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.base_path).join("vectors.bin")
    }
}
