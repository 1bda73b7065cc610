//! Vector store: owns embedding persistence and distance-ranked queries.
//!
//! The engine talks to the `VectorStore` trait; the local backend keeps a
//! `VectorIndex` in memory and writes every change through to vectors.bin.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::semantic::index::{IndexError, Neighbor, VectorIndex};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Vector storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Vector store lock poisoned")]
    LockPoisoned,
}

impl From<IndexError> for StoreError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, got } => {
                StoreError::DimensionMismatch { expected, got }
            }
        }
    }
}

/// Persistence and nearest-neighbor queries for task embeddings.
///
/// `put` is all-or-nothing: after it returns, the stored embedding for the
/// id is either the new value (Ok) or whatever was there before (Err).
pub trait VectorStore: Send + Sync {
    fn put(&self, id: u64, content_hash: u64, embedding: Vec<f32>) -> Result<(), StoreError>;

    /// Remove the embedding for a task. Returns whether one existed.
    fn remove(&self, id: u64) -> Result<bool, StoreError>;

    /// Content hash stored for a task id, if it has an embedding.
    fn content_hash(&self, id: u64) -> Result<Option<u64>, StoreError>;

    /// Up to `limit` stored ids nearest to `query`, ascending by L2
    /// distance, ties by ascending id. Ids without an embedding are never
    /// candidates. `limit == 0` yields an empty result.
    fn query_nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, StoreError>;

    /// All ids that currently have an embedding.
    fn ids(&self) -> Result<Vec<u64>, StoreError>;

    fn len(&self) -> usize;
}

/// File-backed vector store.
pub struct LocalVectorStore {
    index: Mutex<VectorIndex>,
    storage: VectorStorage,
    model_id: [u8; 32],
}

impl LocalVectorStore {
    /// Open the store at `path`, loading existing vectors when they match
    /// the current model and dimensionality. A model or format change is
    /// not an error; the old vectors are useless and the store starts
    /// fresh (reconcile rebuilds them).
    pub fn open(
        path: PathBuf,
        model_id: [u8; 32],
        dimensions: usize,
    ) -> Result<Self, StoreError> {
        let storage = VectorStorage::new(path);

        let mut index = VectorIndex::new(dimensions);
        if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(entries) => {
                    index = VectorIndex::with_capacity(dimensions, entries.len());
                    index.bulk_load(entries)?;
                    log::info!("Loaded {} vectors from storage", index.len());
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("Embedding model changed, starting with an empty vector store");
                }
                Err(VectorStorageError::VersionMismatch(version)) => {
                    log::warn!(
                        "vectors.bin format version {version} unsupported, starting fresh"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Self {
            index: Mutex::new(index),
            storage,
            model_id,
        })
    }

    fn persist(&self, index: &VectorIndex) -> Result<(), StoreError> {
        self.storage.save(
            index
                .iter()
                .map(|(id, entry)| (id, entry.content_hash, entry.embedding.as_slice())),
            index.len() as u64,
            index.dimensions(),
            &self.model_id,
        )?;
        Ok(())
    }
}

impl VectorStore for LocalVectorStore {
    fn put(&self, id: u64, content_hash: u64, embedding: Vec<f32>) -> Result<(), StoreError> {
        let mut index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;

        let previous = index.get(id).cloned();
        index.insert(id, content_hash, embedding)?;

        if let Err(err) = self.persist(&index) {
            // keep memory and disk telling the same story
            match previous {
                Some(entry) => {
                    let _ = index.insert(id, entry.content_hash, entry.embedding);
                }
                None => {
                    index.remove(id);
                }
            }
            return Err(err);
        }

        Ok(())
    }

    fn remove(&self, id: u64) -> Result<bool, StoreError> {
        let mut index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;

        let Some(entry) = index.remove(id) else {
            return Ok(false);
        };

        if let Err(err) = self.persist(&index) {
            let _ = index.insert(id, entry.content_hash, entry.embedding);
            return Err(err);
        }

        Ok(true)
    }

    fn content_hash(&self, id: u64) -> Result<Option<u64>, StoreError> {
        let index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(index.get(id).map(|entry| entry.content_hash))
    }

    fn query_nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, StoreError> {
        let index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(index.query_nearest(query, limit)?)
    }

    fn ids(&self) -> Result<Vec<u64>, StoreError> {
        let index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(index.ids().collect())
    }

    fn len(&self) -> usize {
        self.index.lock().map(|index| index.len()).unwrap_or(0)
    }
}
