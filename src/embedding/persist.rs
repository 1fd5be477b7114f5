//! Binary storage for face embeddings.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - extractor_id: [u8; 32] (SHA256 of the extractor identity)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - embedding_id: u64 (little-endian)
//! - media_id: u64 (little-endian)
//! - vector: [f64; dimensions] (little-endian)
//!
//! The f64 payload is the durable on-disk contract and must round-trip
//! bit-exactly.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::embedding::vector::Embedding;

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + extractor_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Extractor mismatch: file was written by a different extractor")]
    ExtractorMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Reader/writer for the vectors.bin embedding table.
pub struct EmbeddingFile {
    path: PathBuf,
}

impl EmbeddingFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load all embeddings, validating the header against the expected
    /// extractor identity and dimensions.
    pub fn load(
        &self,
        expected_extractor_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<Vec<Embedding>, EmbeddingFileError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = self.read_header(&mut reader)?;
        self.validate_header(&header, expected_extractor_id, expected_dimensions)?;

        let mut embeddings = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            embeddings.push(self.read_entry(&mut reader, header.dimensions as usize)?);
        }

        Ok(embeddings)
    }

    /// Save all embeddings.
    ///
    /// Atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        embeddings: &[Embedding],
        extractor_id: &[u8; 32],
        dimensions: usize,
    ) -> Result<(), EmbeddingFileError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, embeddings, extractor_id, dimensions);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        embeddings: &[Embedding],
        extractor_id: &[u8; 32],
        dimensions: usize,
    ) -> Result<(), EmbeddingFileError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            extractor_id: *extractor_id,
            dimensions: dimensions as u16,
            entry_count: embeddings.len() as u64,
            checksum: 0, // computed on write
        };
        self.write_header(&mut writer, &header)?;

        for embedding in embeddings {
            self.write_entry(&mut writer, embedding)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(&self, reader: &mut BufReader<File>) -> Result<Header, EmbeddingFileError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];

        // Version check first
        if version > FORMAT_VERSION {
            return Err(EmbeddingFileError::VersionMismatch(version, FORMAT_VERSION));
        }

        let mut extractor_id = [0u8; 32];
        extractor_id.copy_from_slice(&header_bytes[1..33]);

        let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
        let entry_count = u64::from_le_bytes(
            header_bytes[35..43]
                .try_into()
                .expect("8-byte slice for u64"),
        );
        let stored_checksum = u32::from_le_bytes(
            header_bytes[43..47]
                .try_into()
                .expect("4-byte slice for u32"),
        );

        let computed_checksum = crc32fast::hash(&header_bytes[0..43]);
        if stored_checksum != computed_checksum {
            return Err(EmbeddingFileError::ChecksumMismatch);
        }

        Ok(Header {
            version,
            extractor_id,
            dimensions,
            entry_count,
            checksum: stored_checksum,
        })
    }

    fn validate_header(
        &self,
        header: &Header,
        expected_extractor_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(), EmbeddingFileError> {
        if header.extractor_id != *expected_extractor_id {
            return Err(EmbeddingFileError::ExtractorMismatch);
        }

        if header.dimensions as usize != expected_dimensions {
            return Err(EmbeddingFileError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        Ok(())
    }

    fn write_header(
        &self,
        writer: &mut BufWriter<File>,
        header: &Header,
    ) -> Result<(), EmbeddingFileError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.extractor_id);
        header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..43]);
        header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_entry(
        &self,
        reader: &mut BufReader<File>,
        dimensions: usize,
    ) -> Result<Embedding, EmbeddingFileError> {
        let mut id_bytes = [0u8; 8];
        reader.read_exact(&mut id_bytes)?;
        let id = u64::from_le_bytes(id_bytes);

        let mut media_id_bytes = [0u8; 8];
        reader.read_exact(&mut media_id_bytes)?;
        let media_id = u64::from_le_bytes(media_id_bytes);

        let mut vector = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 8];
            reader.read_exact(&mut float_bytes)?;
            vector.push(f64::from_le_bytes(float_bytes));
        }

        Ok(Embedding {
            id,
            media_id,
            vector,
        })
    }

    fn write_entry(
        &self,
        writer: &mut BufWriter<File>,
        embedding: &Embedding,
    ) -> Result<(), EmbeddingFileError> {
        writer.write_all(&embedding.id.to_le_bytes())?;
        writer.write_all(&embedding.media_id.to_le_bytes())?;

        for &value in &embedding.vector {
            writer.write_all(&value.to_le_bytes())?;
        }

        Ok(())
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    extractor_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
    checksum: u32,
}
