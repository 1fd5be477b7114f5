//! The external face extractor contract.
//!
//! Detection and encoding are not implemented here. The core only consumes
//! the contract: a decoded frame in, zero or more fixed-dimension f64
//! vectors out, deterministic for deterministic input.

use std::io::Write;
use std::process::{Command, Stdio};

/// One decoded RGB frame handed to the extractor.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8, row-major.
    pub rgb: Vec<u8>,
}

impl DecodedFrame {
    /// Encode the frame as PNG for transport to an external process.
    pub fn to_png_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let image = image::RgbImage::from_raw(self.width, self.height, self.rgb.clone())
            .ok_or_else(|| anyhow::anyhow!("frame buffer does not match dimensions"))?;

        let mut bytes = Vec::new();
        image.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )?;
        Ok(bytes)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("extractor I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("extractor exited with {status}: {stderr}")]
    Process { status: String, stderr: String },

    #[error("extractor produced malformed output: {0}")]
    Malformed(String),

    #[error("extractor returned a {got}-dim vector, expected {expected}")]
    Dimension { expected: usize, got: usize },
}

/// Contract consumed by ingestion and search.
pub trait FaceExtractor: Send + Sync {
    /// Zero or more embedding vectors for the faces in one frame.
    fn extract(&self, frame: &DecodedFrame) -> Result<Vec<Vec<f64>>, ExtractError>;

    fn dimensions(&self) -> usize;

    /// Stable identity hash, stamped into vectors.bin so embeddings from
    /// different extractors never get mixed.
    fn id_hash(&self) -> [u8; 32];
}

/// Extractor backed by an external command.
///
/// Protocol: the frame is written to the child's stdin as PNG bytes; the
/// child prints a JSON array of D-float arrays (one per detected face) to
/// stdout and exits 0.
pub struct CommandExtractor {
    command: String,
    args: Vec<String>,
    dimensions: usize,
}

impl CommandExtractor {
    pub fn new(command: &str, dimensions: usize) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            command: program,
            args: parts.collect(),
            dimensions,
        }
    }
}

impl FaceExtractor for CommandExtractor {
    fn extract(&self, frame: &DecodedFrame) -> Result<Vec<Vec<f64>>, ExtractError> {
        let png = frame
            .to_png_bytes()
            .map_err(|err| ExtractError::Malformed(format!("frame encode failed: {err}")))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // the child may emit more than a pipe buffer of output before it
        // drains stdin, so the write runs on its own thread while we read
        let mut stdin = child.stdin.take().expect("stdin piped above");
        let writer = std::thread::spawn(move || {
            // a child that exits without consuming all of stdin is fine
            let _ = stdin.write_all(&png);
        });

        let output = child.wait_with_output()?;
        let _ = writer.join();
        if !output.status.success() {
            return Err(ExtractError::Process {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let vectors: Vec<Vec<f64>> = serde_json::from_slice(&output.stdout)
            .map_err(|err| ExtractError::Malformed(err.to_string()))?;

        for vector in &vectors {
            if vector.len() != self.dimensions {
                return Err(ExtractError::Dimension {
                    expected: self.dimensions,
                    got: vector.len(),
                });
            }
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn id_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.command.as_bytes());
        for arg in &self.args {
            hasher.update(arg.as_bytes());
        }
        hasher.update(self.dimensions.to_le_bytes());
        hasher.finalize().into()
    }
}
