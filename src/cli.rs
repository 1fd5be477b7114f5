use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP daemon
    Daemon {},

    /// Ingest media files and wait for processing to finish
    Ingest {
        /// Image or video files to ingest
        paths: Vec<String>,
    },

    /// Find media containing a face similar to the query image
    Search {
        /// Query image file
        path: String,

        /// Minimum cosine score [-1.0, 1.0]
        #[clap(short, long)]
        threshold: Option<f64>,
    },

    /// List all media items
    Media {},
}
