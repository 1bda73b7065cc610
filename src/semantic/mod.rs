//! Embedding-backed similarity search for tasks.
//!
//! This module turns task text into fixed-dimensional vectors with
//! fastembed, persists them next to the task database, and answers
//! nearest-neighbor queries by L2 distance.
//!
//! # Architecture
//!
//! - `embeddings`: the `Embedder` trait and its fastembed implementation
//! - `preprocess`: text preparation and change-detection hashing
//! - `index`: in-memory vector index with exact L2 nearest-neighbor search
//! - `storage`: binary file I/O for vectors.bin persistence
//! - `store`: the `VectorStore` trait and its write-through local backend
//! - `engine`: the similarity engine with its fail-soft upsert/search policy

pub mod embeddings;
pub mod engine;
mod index;
mod preprocess;
mod storage;
pub mod store;

pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use engine::{EngineError, ReconcileReport, SearchHit, SimilarityEngine, UpsertOutcome};
pub use index::{IndexError, Neighbor, VectorIndex};
pub use preprocess::{content_hash, embedding_input};
pub use store::{LocalVectorStore, StoreError, VectorStore};
