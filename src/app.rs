//! Application wiring: config + task store + lazily-initialized similarity
//! engine.
//!
//! The embedding model download is expensive, so the engine only comes up
//! the first time a semantic operation needs it. Task CRUD never fails
//! because of the semantic side; embedding maintenance is fail-soft
//! throughout.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::semantic::{
    Embedder, EmbeddingError, EmbeddingModel, LocalVectorStore, ReconcileReport, SearchHit,
    SimilarityEngine, StoreError, embedding_input,
};
use crate::storage::BackendLocal;
use crate::tasks::{Task, TaskCreate, TaskError, TaskManager, TaskManagerLocal, TaskUpdate};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Embedding model error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Task(TaskError::NotFound(_)))
    }
}

pub struct App {
    config: Config,
    tasks: Arc<dyn TaskManager>,
    engine: Mutex<Option<Arc<SimilarityEngine>>>,
}

impl App {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let storage = Arc::new(BackendLocal::new(config.base_path())?);
        let tasks: Arc<dyn TaskManager> = Arc::new(TaskManagerLocal::load(storage)?);

        Ok(Self {
            config,
            tasks,
            engine: Mutex::new(None),
        })
    }

    /// Build an App around an existing engine. Lets tests supply a stub
    /// embedder instead of downloading a model.
    #[cfg(test)]
    pub fn with_engine(
        config: Config,
        tasks: Arc<dyn TaskManager>,
        engine: Arc<SimilarityEngine>,
    ) -> Self {
        Self {
            config,
            tasks,
            engine: Mutex::new(Some(engine)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.all()
    }

    /// Create a task and, fail-soft, embed its text.
    pub fn add_task(&self, create: TaskCreate) -> Result<Task, AppError> {
        let task = self.tasks.create(create)?;
        self.refresh_embedding(&task);
        Ok(task)
    }

    /// Update a task and, fail-soft, bring its embedding up to date.
    pub fn update_task(&self, id: u64, update: TaskUpdate) -> Result<Task, AppError> {
        let task = self.tasks.update(id, update)?;
        self.refresh_embedding(&task);
        Ok(task)
    }

    /// Delete a task. Its vector is removed when the engine is already up;
    /// otherwise the next reconcile prunes it (search hydration filters it
    /// out in the meantime).
    pub fn delete_task(&self, id: u64) -> Result<(), AppError> {
        self.tasks.delete(id)?;

        if let Some(engine) = self.engine_if_initialized() {
            engine.remove_embedding(id);
        }

        Ok(())
    }

    /// Gateway operation: upsert the embedding for a task id from the
    /// given text. Empty or absent text succeeds as a no-op without ever
    /// touching the model or the store.
    pub fn upsert_embedding(&self, id: u64, text: Option<&str>) -> bool {
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return true;
        };

        match self.engine() {
            Ok(engine) => engine.upsert_embedding(id, text),
            Err(err) => {
                tracing::error!("Similarity engine unavailable: {err}");
                false
            }
        }
    }

    /// Gateway operation: similarity search, fail-soft. Degrades to an
    /// empty result list when the engine cannot come up.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<SearchHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        match self.engine() {
            Ok(engine) => engine.search(query, limit),
            Err(err) => {
                tracing::error!("Similarity engine unavailable: {err}");
                Vec::new()
            }
        }
    }

    /// Rebuild embeddings for the whole task set. Unlike the fail-soft
    /// operations this surfaces engine startup failures, because the
    /// caller explicitly asked for embedding maintenance.
    pub fn reconcile(&self) -> Result<ReconcileReport, AppError> {
        Ok(self.engine()?.reconcile())
    }

    fn refresh_embedding(&self, task: &Task) {
        match embedding_input(&task.title, &task.description) {
            Some(text) => {
                if !self.upsert_embedding(task.id, Some(&text)) {
                    tracing::warn!("Task {} saved without an embedding", task.id);
                }
            }
            None => {
                if let Some(engine) = self.engine_if_initialized() {
                    engine.remove_embedding(task.id);
                }
            }
        }
    }

    fn engine_if_initialized(&self) -> Option<Arc<SimilarityEngine>> {
        self.engine.lock().ok()?.clone()
    }

    /// Get the similarity engine, initializing it on first use.
    fn engine(&self) -> Result<Arc<SimilarityEngine>, AppError> {
        let mut guard = self.engine.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(engine) = guard.as_ref() {
            return Ok(engine.clone());
        }

        let engine = Arc::new(self.build_engine()?);
        *guard = Some(engine.clone());
        Ok(engine)
    }

    fn build_engine(&self) -> Result<SimilarityEngine, AppError> {
        let embedding = &self.config.embedding;
        log::info!("Initializing similarity engine with model '{}'", embedding.model);

        let base_path = PathBuf::from(self.config.base_path());
        let timeout = Duration::from_secs(embedding.download_timeout_secs);
        let model = EmbeddingModel::new(&embedding.model, base_path.clone(), Some(timeout))?;

        let model_id = model.model_id();
        let dimensions = model.dimensions();

        let store = LocalVectorStore::open(base_path.join("vectors.bin"), model_id, dimensions)?;

        Ok(SimilarityEngine::new(
            Arc::new(model),
            Arc::new(store),
            self.tasks.clone(),
            embedding.default_limit,
        ))
    }
}
