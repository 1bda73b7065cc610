//! Similarity engine: composes the embedder and the vector store.
//!
//! Embedding is a best-effort enrichment on top of the task workflow, so
//! every public operation here degrades instead of failing hard: a broken
//! model or an unreachable store turns `upsert_embedding` into a reported
//! `false` and `search` into an empty result list. The typed `try_*`
//! variants expose the underlying errors for callers that want them.

use std::sync::Arc;

use serde::Serialize;

use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::preprocess::content_hash;
use crate::semantic::store::{StoreError, VectorStore};
use crate::tasks::TaskManager;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),
}

/// What an upsert actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new or changed embedding was written to the store.
    Written,
    /// The text was empty; nothing to embed, nothing written.
    SkippedEmpty,
    /// The stored embedding already matches this text.
    SkippedUnchanged,
}

/// One similarity search result, hydrated with the task's fields.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub distance: f32,
}

/// Outcome of a reconcile pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReconcileReport {
    /// Tasks whose embedding was (re)computed
    pub embedded: usize,
    /// Tasks whose stored embedding was already current
    pub unchanged: usize,
    /// Vectors removed (task gone, or its text became empty)
    pub removed: usize,
    /// Tasks that failed to embed or persist (logged, not fatal)
    pub failed: usize,
}

pub struct SimilarityEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    tasks: Arc<dyn TaskManager>,
    default_limit: usize,
}

impl SimilarityEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        tasks: Arc<dyn TaskManager>,
        default_limit: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            tasks,
            default_limit,
        }
    }

    /// Number of tasks with a stored embedding.
    pub fn indexed_count(&self) -> usize {
        self.store.len()
    }

    /// Create or overwrite the embedding for a task.
    ///
    /// Empty text is a defined no-op, not an error; text identical to what
    /// is already stored is skipped (the model is deterministic, so the
    /// write would be a no-op anyway).
    pub fn try_upsert_embedding(&self, id: u64, text: &str) -> Result<UpsertOutcome, EngineError> {
        if text.trim().is_empty() {
            return Ok(UpsertOutcome::SkippedEmpty);
        }

        let hash = content_hash(text);
        if self.store.content_hash(id)? == Some(hash) {
            return Ok(UpsertOutcome::SkippedUnchanged);
        }

        let Some(embedding) = self.embedder.embed(text)? else {
            return Ok(UpsertOutcome::SkippedEmpty);
        };

        self.store.put(id, hash, embedding)?;
        Ok(UpsertOutcome::Written)
    }

    /// Fail-soft upsert: reports success, never propagates the failure.
    pub fn upsert_embedding(&self, id: u64, text: &str) -> bool {
        match self.try_upsert_embedding(id, text) {
            Ok(_) => true,
            Err(err) => {
                tracing::error!("Failed to upsert embedding for task {id}: {err}");
                false
            }
        }
    }

    /// Find tasks whose text is semantically closest to `query`.
    ///
    /// An empty query yields an empty result. `limit` falls back to the
    /// configured default when not given. Results come back ascending by
    /// distance; ids whose task no longer exists are dropped.
    pub fn try_search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, EngineError> {
        let Some(query_embedding) = self.embedder.embed(query)? else {
            return Ok(Vec::new());
        };

        let limit = limit.unwrap_or(self.default_limit);
        let neighbors = self.store.query_nearest(&query_embedding, limit)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let task = self.tasks.get(neighbor.id)?;
                Some(SearchHit {
                    id: task.id,
                    title: task.title,
                    description: task.description,
                    status: task.status,
                    distance: neighbor.distance,
                })
            })
            .collect())
    }

    /// Fail-soft search: a failed search degrades to "no results".
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<SearchHit> {
        match self.try_search(query, limit) {
            Ok(hits) => hits,
            Err(err) => {
                tracing::error!("Similarity search failed: {err}");
                Vec::new()
            }
        }
    }

    /// Drop the stored embedding for a task, fail-soft.
    pub fn remove_embedding(&self, id: u64) -> bool {
        match self.store.remove(id) {
            Ok(_) => true,
            Err(err) => {
                tracing::error!("Failed to remove embedding for task {id}: {err}");
                false
            }
        }
    }

    /// Bring the vector store in line with the task database: embed tasks
    /// with missing or stale vectors, drop vectors whose task is gone or
    /// whose text became empty. Per-task failures are logged and counted,
    /// never fatal.
    pub fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let tasks = self.tasks.all();

        for task in &tasks {
            let text = crate::semantic::preprocess::embedding_input(&task.title, &task.description);

            let Some(text) = text else {
                // task has no embeddable text; drop any leftover vector
                match self.store.remove(task.id) {
                    Ok(true) => report.removed += 1,
                    Ok(false) => {}
                    Err(err) => {
                        tracing::warn!("Reconcile failed for task {}: {err}", task.id);
                        report.failed += 1;
                    }
                }
                continue;
            };

            match self.try_upsert_embedding(task.id, &text) {
                Ok(UpsertOutcome::Written) => report.embedded += 1,
                Ok(UpsertOutcome::SkippedUnchanged) => report.unchanged += 1,
                Ok(UpsertOutcome::SkippedEmpty) => {}
                Err(err) => {
                    tracing::warn!("Reconcile failed for task {}: {err}", task.id);
                    report.failed += 1;
                }
            }
        }

        // prune vectors for tasks that no longer exist
        match self.store.ids() {
            Ok(ids) => {
                for id in ids {
                    if self.tasks.get(id).is_none() {
                        match self.store.remove(id) {
                            Ok(true) => report.removed += 1,
                            Ok(false) => {}
                            Err(err) => {
                                tracing::warn!("Failed to prune vector for task {id}: {err}");
                                report.failed += 1;
                            }
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!("Could not list stored vectors during reconcile: {err}");
                report.failed += 1;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::store::LocalVectorStore;
    use crate::storage::BackendLocal;
    use crate::tasks::{TaskCreate, TaskManagerLocal};
    use std::collections::HashMap;

    /// Deterministic 2-dimensional embedder for tests. Known texts map to
    /// fixed vectors; anything else gets a hash-derived one.
    struct StubEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl StubEmbedder {
        fn new(pairs: &[(&str, [f32; 2])]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.to_vec()))
                    .collect(),
            }
        }
    }

    impl Embedder for StubEmbedder {
        fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
            if text.trim().is_empty() {
                return Ok(None);
            }
            if let Some(v) = self.vectors.get(text) {
                return Ok(Some(v.clone()));
            }
            let h = content_hash(text);
            Ok(Some(vec![
                (h % 1000) as f32 / 1000.0,
                (h / 1000 % 1000) as f32 / 1000.0,
            ]))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_id(&self) -> [u8; 32] {
            [1u8; 32]
        }
    }

    /// Embedder that always fails, for the fail-soft paths.
    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::EmbeddingFailed("model unavailable".into()))
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_id(&self) -> [u8; 32] {
            [2u8; 32]
        }
    }

    /// Vector store whose every call fails, standing in for an unreachable
    /// backend.
    struct BrokenStore;

    fn store_failure() -> StoreError {
        StoreError::Storage(
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store down").into(),
        )
    }

    impl VectorStore for BrokenStore {
        fn put(&self, _: u64, _: u64, _: Vec<f32>) -> Result<(), StoreError> {
            Err(store_failure())
        }
        fn remove(&self, _: u64) -> Result<bool, StoreError> {
            Err(store_failure())
        }
        fn content_hash(&self, _: u64) -> Result<Option<u64>, StoreError> {
            Err(store_failure())
        }
        fn query_nearest(&self, _: &[f32], _: usize) -> Result<Vec<Neighbor>, StoreError> {
            Err(store_failure())
        }
        fn ids(&self) -> Result<Vec<u64>, StoreError> {
            Err(store_failure())
        }
        fn len(&self) -> usize {
            0
        }
    }

    use crate::semantic::index::Neighbor;

    struct Fixture {
        _dir: tempfile::TempDir,
        tasks: Arc<TaskManagerLocal>,
        engine: SimilarityEngine,
    }

    fn fixture(embedder: Arc<dyn Embedder>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(BackendLocal::new(dir.path().to_str().unwrap()).unwrap());
        let tasks = Arc::new(TaskManagerLocal::load(storage).unwrap());
        let store = Arc::new(
            LocalVectorStore::open(
                dir.path().join("vectors.bin"),
                embedder.model_id(),
                embedder.dimensions(),
            )
            .unwrap(),
        );
        let engine = SimilarityEngine::new(embedder, store, tasks.clone(), 3);
        Fixture {
            _dir: dir,
            tasks,
            engine,
        }
    }

    fn broken_store_engine() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(BackendLocal::new(dir.path().to_str().unwrap()).unwrap());
        let tasks = Arc::new(TaskManagerLocal::load(storage).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(&[]));
        let engine = SimilarityEngine::new(embedder, Arc::new(BrokenStore), tasks.clone(), 3);
        Fixture {
            _dir: dir,
            tasks,
            engine,
        }
    }

    fn add_task(tasks: &TaskManagerLocal, title: &str) -> u64 {
        tasks
            .create(TaskCreate {
                title: title.into(),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_upsert_empty_text_is_a_noop() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));

        let outcome = f.engine.try_upsert_embedding(1, "").unwrap();
        assert_eq!(outcome, UpsertOutcome::SkippedEmpty);
        assert_eq!(f.engine.indexed_count(), 0);

        let outcome = f.engine.try_upsert_embedding(1, "  \n ").unwrap();
        assert_eq!(outcome, UpsertOutcome::SkippedEmpty);
        assert_eq!(f.engine.indexed_count(), 0);
    }

    #[test]
    fn test_upsert_then_self_search_returns_zero_distance() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));
        let id = add_task(&f.tasks, "buy milk");

        let outcome = f.engine.try_upsert_embedding(id, "buy milk").unwrap();
        assert_eq!(outcome, UpsertOutcome::Written);

        let hits = f.engine.try_search("buy milk", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].title, "buy milk");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_upsert_unchanged_text_is_skipped() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));
        let id = add_task(&f.tasks, "buy milk");

        assert_eq!(
            f.engine.try_upsert_embedding(id, "buy milk").unwrap(),
            UpsertOutcome::Written
        );
        assert_eq!(
            f.engine.try_upsert_embedding(id, "buy milk").unwrap(),
            UpsertOutcome::SkippedUnchanged
        );
        assert_eq!(
            f.engine.try_upsert_embedding(id, "buy bread").unwrap(),
            UpsertOutcome::Written
        );
    }

    #[test]
    fn test_search_empty_query_returns_empty() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));
        let id = add_task(&f.tasks, "buy milk");
        f.engine.upsert_embedding(id, "buy milk");

        assert!(f.engine.try_search("", None).unwrap().is_empty());
        assert!(f.engine.search("", Some(3)).is_empty());
    }

    #[test]
    fn test_search_ranking_matches_worked_example() {
        let embedder = StubEmbedder::new(&[
            ("buy milk", [1.0, 0.0]),
            ("buy bread", [0.9, 0.1]),
            ("run a marathon", [-1.0, 0.8]),
            ("shopping for groceries", [0.95, 0.05]),
        ]);
        let f = fixture(Arc::new(embedder));

        for title in ["buy milk", "buy bread", "run a marathon"] {
            let id = add_task(&f.tasks, title);
            f.engine.upsert_embedding(id, title);
        }

        let hits = f.engine.search("shopping for groceries", Some(10));
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);

        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_search_default_limit_is_three() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));

        for i in 0..5 {
            let id = add_task(&f.tasks, &format!("task number {i}"));
            f.engine.upsert_embedding(id, &format!("task number {i}"));
        }

        assert_eq!(f.engine.search("task number 0", None).len(), 3);
        assert_eq!(f.engine.search("task number 0", Some(2)).len(), 2);
        assert!(f.engine.search("task number 0", Some(0)).is_empty());
    }

    #[test]
    fn test_tasks_without_embeddings_are_never_returned() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));
        let embedded = add_task(&f.tasks, "buy milk");
        let _bare = add_task(&f.tasks, "no embedding here");
        f.engine.upsert_embedding(embedded, "buy milk");

        let hits = f.engine.search("anything at all", Some(10));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, embedded);
    }

    #[test]
    fn test_hydration_drops_deleted_tasks() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));
        let id = add_task(&f.tasks, "buy milk");
        f.engine.upsert_embedding(id, "buy milk");

        f.tasks.delete(id).unwrap();

        // vector still stored, but the hit has nothing to hydrate from
        assert_eq!(f.engine.indexed_count(), 1);
        assert!(f.engine.search("buy milk", Some(10)).is_empty());
    }

    #[test]
    fn test_store_failure_degrades_softly() {
        let f = broken_store_engine();
        let id = add_task(&f.tasks, "buy milk");

        assert!(!f.engine.upsert_embedding(id, "buy milk"));
        assert!(f.engine.search("buy milk", Some(3)).is_empty());

        // the typed variants surface the failure
        assert!(matches!(
            f.engine.try_upsert_embedding(id, "buy milk"),
            Err(EngineError::Store(_))
        ));
        assert!(matches!(
            f.engine.try_search("buy milk", None),
            Err(EngineError::Store(_))
        ));
    }

    #[test]
    fn test_embedder_failure_degrades_softly() {
        let f = fixture(Arc::new(BrokenEmbedder));
        let id = add_task(&f.tasks, "buy milk");

        assert!(!f.engine.upsert_embedding(id, "buy milk"));
        assert!(f.engine.search("buy milk", None).is_empty());
        assert!(matches!(
            f.engine.try_upsert_embedding(id, "buy milk"),
            Err(EngineError::Embedding(_))
        ));
        // nothing was persisted
        assert_eq!(f.engine.indexed_count(), 0);
    }

    #[test]
    fn test_reconcile_embeds_missing_and_prunes_orphans() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));
        let kept = add_task(&f.tasks, "buy milk");
        let doomed = add_task(&f.tasks, "temporary");
        f.engine.upsert_embedding(doomed, "temporary");
        f.tasks.delete(doomed).unwrap();

        let report = f.engine.reconcile();
        assert_eq!(report.embedded, 1); // kept got its vector
        assert_eq!(report.removed, 1); // doomed's vector pruned
        assert_eq!(report.failed, 0);

        let hits = f.engine.search("buy milk", Some(10));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, kept);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let f = fixture(Arc::new(StubEmbedder::new(&[])));
        add_task(&f.tasks, "buy milk");

        let first = f.engine.reconcile();
        assert_eq!(first.embedded, 1);

        let second = f.engine.reconcile();
        assert_eq!(second.embedded, 0);
        assert_eq!(second.unchanged, 1);
    }
}
