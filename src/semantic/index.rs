//! In-memory vector index with exact L2 nearest-neighbor search.

use std::collections::HashMap;

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Hash of the text that was embedded
    pub content_hash: u64,
    /// The embedding vector
    pub embedding: Vec<f32>,
}

/// A search hit before task fields are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Task ID
    pub id: u64,
    /// Euclidean (L2) distance to the query; smaller is more similar
    pub distance: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Vector index keyed by task ID.
///
/// Every embedding must match the index dimensionality; a mismatch is a
/// configuration error and is rejected rather than truncated or padded.
pub struct VectorIndex {
    entries: HashMap<u64, VectorEntry>,
    dimensions: usize,
}

impl VectorIndex {
    /// Create a new empty vector index with the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or overwrite the entry for a task ID.
    pub fn insert(
        &mut self,
        id: u64,
        content_hash: u64,
        embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        self.entries.insert(
            id,
            VectorEntry {
                content_hash,
                embedding,
            },
        );

        Ok(())
    }

    pub fn remove(&mut self, id: u64) -> Option<VectorEntry> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&VectorEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    /// All task IDs with a stored embedding.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &VectorEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Return up to `limit` entries nearest to `query` by L2 distance,
    /// ascending. Ties are broken by ascending task ID so the ordering is
    /// stable. `limit == 0` yields an empty result.
    pub fn query_nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .entries
            .iter()
            .map(|(id, entry)| Neighbor {
                id: *id,
                distance: l2_distance(query, &entry.embedding),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        neighbors.truncate(limit);

        Ok(neighbors)
    }

    /// Bulk load entries, used when loading from storage.
    pub fn bulk_load(&mut self, entries: Vec<(u64, u64, Vec<f32>)>) -> Result<(), IndexError> {
        for (id, content_hash, embedding) in entries {
            self.insert(id, content_hash, embedding)?;
        }
        Ok(())
    }
}

/// Euclidean distance between two vectors of equal length.
fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}
