use std::sync::{Arc, RwLock};

use clap::Parser;

mod cli;
mod config;
mod embedding;
mod extract;
mod frames;
mod ingest;
mod media;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use embedding::{EmbeddingStore, SearchEngine};
use extract::{CommandExtractor, FaceExtractor};
use ingest::Ingestor;
use media::MediaManager;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config = Config::load();

    let media_mgr: Arc<dyn MediaManager> =
        Arc::new(media::BackendCsv::load(&config.media_csv_path())?);
    let storage_mgr: Arc<dyn storage::StorageManager> =
        Arc::new(storage::BackendLocal::new(&config.uploads_dir())?);
    let extractor: Arc<dyn FaceExtractor> = Arc::new(CommandExtractor::new(
        &config.extractor.command,
        config.extractor.dimensions,
    ));

    let store = Arc::new(EmbeddingStore::open(
        media_mgr,
        config.vectors_path(),
        extractor.id_hash(),
        extractor.dimensions(),
    )?);
    let engine = Arc::new(SearchEngine::new(store.clone(), config.search.threshold));

    let uploads_dir = config.uploads_dir();
    let listen_addr = config.listen_addr.clone();
    let config = Arc::new(RwLock::new(config));

    let mut ingestor = Ingestor::new(
        store.clone(),
        storage_mgr,
        extractor.clone(),
        config.clone(),
    );

    match args.command {
        cli::Command::Daemon {} => {
            ingestor.run_queue();
            web::start_daemon(ingestor, engine, extractor, store, uploads_dir, listen_addr);
            Ok(())
        }

        cli::Command::Ingest { paths } => {
            if paths.is_empty() {
                anyhow::bail!("nothing to ingest");
            }

            for path in paths {
                let data = std::fs::read(&path)?;
                let filename = std::path::Path::new(&path)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or(path.as_str())
                    .to_string();

                let media_id = ingestor.accept(&filename, &data)?;
                ingestor.process_one(media_id)?;
                println!("{}", serde_json::json!({"media_id": media_id, "filename": filename}));
            }

            Ok(())
        }

        cli::Command::Search { path, threshold } => {
            let data = std::fs::read(&path)?;

            match engine.search_image(extractor.as_ref(), &data, threshold) {
                Ok(matches) => {
                    println!("{}", serde_json::to_string_pretty(&matches).unwrap());
                    Ok(())
                }
                Err(err @ embedding::SearchError::NoFaceDetected)
                | Err(err @ embedding::SearchError::NoMatches) => {
                    println!("{}", serde_json::json!({"error": err.to_string()}));
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }

        cli::Command::Media {} => {
            println!(
                "{}",
                serde_json::to_string_pretty(&store.media_all()).unwrap()
            );
            Ok(())
        }
    }
}
