//! Binary persistence for task embeddings (vectors.bin).
//!
//! Header (47 bytes, little-endian):
//! - version: u8
//! - dimensions: u16
//! - entry_count: u64
//! - model_id: [u8; 32] (SHA256 of the embedder model name)
//! - checksum: u32 (CRC32 of the preceding header bytes)
//!
//! Entries (repeated `entry_count` times):
//! - task_id: u64
//! - content_hash: u64
//! - embedding: [f32; dimensions]
//!
//! Saves go through a temp file and a rename, so a reader either sees the
//! previous complete file or the new one, never a torn write.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// version(1) + dimensions(2) + entry_count(8) + model_id(32) + checksum(4)
const HEADER_SIZE: usize = 47;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format version {0} (this build reads up to {FORMAT_VERSION})")]
    VersionMismatch(u8),

    #[error("Vectors were built with a different embedding model")]
    ModelMismatch,

    #[error("Checksum mismatch: vectors.bin may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// A persisted embedding record: (task id, content hash, vector).
pub type StoredEntry = (u64, u64, Vec<f32>);

/// Reads and writes the vectors.bin file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load all entries, validating that the file was produced by the
    /// expected model at the expected dimensionality.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<Vec<StoredEntry>, VectorStorageError> {
        let mut reader = BufReader::new(File::open(&self.path)?);

        let header = read_header(&mut reader)?;

        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }
        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        let dims = header.dimensions as usize;
        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            entries.push(read_entry(&mut reader, dims)?);
        }

        Ok(entries)
    }

    /// Save entries atomically: write a temp file, fsync, rename over the
    /// previous one.
    pub fn save<'a, I>(
        &self,
        entries: I,
        entry_count: u64,
        dimensions: usize,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError>
    where
        I: Iterator<Item = (u64, u64, &'a [f32])>,
    {
        let temp_path = self.path.with_extension("bin.tmp");

        let written = self.write_file(&temp_path, entries, entry_count, dimensions, model_id);
        if let Err(err) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err);
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn write_file<'a, I>(
        &self,
        path: &Path,
        entries: I,
        entry_count: u64,
        dimensions: usize,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError>
    where
        I: Iterator<Item = (u64, u64, &'a [f32])>,
    {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write_header(&mut writer, dimensions as u16, entry_count, model_id)?;

        for (id, content_hash, embedding) in entries {
            writer.write_all(&id.to_le_bytes())?;
            writer.write_all(&content_hash.to_le_bytes())?;
            for value in embedding {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }
}

struct Header {
    dimensions: u16,
    entry_count: u64,
    model_id: [u8; 32],
}

fn write_header<W: Write>(
    writer: &mut W,
    dimensions: u16,
    entry_count: u64,
    model_id: &[u8; 32],
) -> Result<(), VectorStorageError> {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0] = FORMAT_VERSION;
    buf[1..3].copy_from_slice(&dimensions.to_le_bytes());
    buf[3..11].copy_from_slice(&entry_count.to_le_bytes());
    buf[11..43].copy_from_slice(model_id);

    let checksum = crc32fast::hash(&buf[0..43]);
    buf[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&buf)?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, VectorStorageError> {
    let mut buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut buf)?;

    let version = buf[0];
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version));
    }

    let stored_checksum = u32::from_le_bytes(buf[43..47].try_into().expect("4-byte slice"));
    if stored_checksum != crc32fast::hash(&buf[0..43]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let dimensions = u16::from_le_bytes(buf[1..3].try_into().expect("2-byte slice"));
    let entry_count = u64::from_le_bytes(buf[3..11].try_into().expect("8-byte slice"));
    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&buf[11..43]);

    Ok(Header {
        dimensions,
        entry_count,
        model_id,
    })
}

fn read_entry<R: Read>(reader: &mut R, dims: usize) -> Result<StoredEntry, VectorStorageError> {
    let mut id_buf = [0u8; 8];
    reader.read_exact(&mut id_buf)?;
    let id = u64::from_le_bytes(id_buf);

    let mut hash_buf = [0u8; 8];
    reader.read_exact(&mut hash_buf)?;
    let content_hash = u64::from_le_bytes(hash_buf);

    let mut raw = vec![0u8; dims * 4];
    reader.read_exact(&mut raw)?;
    let embedding = raw
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("4-byte chunk")))
        .collect();

    Ok((id, content_hash, embedding))
}
