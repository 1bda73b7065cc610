use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::storage::StorageManager;

/// Default status for newly created tasks
pub const DEFAULT_STATUS: &str = "todo";

/// File the task list is persisted to (JSON array of tasks)
const TASKS_FILE: &str = "tasks.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: DateTime<Utc>,
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskCreate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task with id {0} not found")]
    NotFound(u64),

    #[error("Title is required")]
    TitleRequired,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task database is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub trait TaskManager: Send + Sync {
    fn create(&self, create: TaskCreate) -> Result<Task, TaskError>;
    fn update(&self, id: u64, update: TaskUpdate) -> Result<Task, TaskError>;
    fn delete(&self, id: u64) -> Result<(), TaskError>;
    fn get(&self, id: u64) -> Option<Task>;
    /// All tasks, newest first (matches list endpoints).
    fn all(&self) -> Vec<Task>;
}

/// Task store backed by a JSON file through the storage backend.
///
/// The whole list lives in memory behind an RwLock and is rewritten to disk
/// after every mutation. Fine for the scale this tool targets.
pub struct TaskManagerLocal {
    list: Arc<RwLock<Vec<Task>>>,
    storage: Arc<dyn StorageManager>,
}

impl TaskManagerLocal {
    pub fn load(storage: Arc<dyn StorageManager>) -> Result<Self, TaskError> {
        let tasks: Vec<Task> = if storage.exists(TASKS_FILE) {
            serde_json::from_slice(&storage.read(TASKS_FILE)?)?
        } else {
            log::info!("Creating new task database");
            Vec::new()
        };

        Ok(Self {
            list: Arc::new(RwLock::new(tasks)),
            storage,
        })
    }

    fn save(&self, tasks: &[Task]) -> Result<(), TaskError> {
        let data = serde_json::to_vec_pretty(tasks)?;
        self.storage.write(TASKS_FILE, &data)?;
        Ok(())
    }
}

impl TaskManager for TaskManagerLocal {
    fn create(&self, create: TaskCreate) -> Result<Task, TaskError> {
        if create.title.trim().is_empty() {
            return Err(TaskError::TitleRequired);
        }

        let mut tasks = self.list.write().unwrap();

        let id = tasks.iter().map(|t| t.id).max().map_or(1, |max| max + 1);
        let task = Task {
            id,
            title: create.title,
            description: create.description.unwrap_or_default(),
            status: create.status.unwrap_or_else(default_status),
            created_at: Utc::now(),
        };

        tasks.push(task.clone());
        self.save(&tasks)?;

        Ok(task)
    }

    fn update(&self, id: u64, update: TaskUpdate) -> Result<Task, TaskError> {
        let mut tasks = self.list.write().unwrap();

        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskError::NotFound(id))?;

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(status) = update.status {
            task.status = status;
        }

        let task = task.clone();
        self.save(&tasks)?;

        Ok(task)
    }

    fn delete(&self, id: u64) -> Result<(), TaskError> {
        let mut tasks = self.list.write().unwrap();

        let idx = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TaskError::NotFound(id))?;
        tasks.remove(idx);

        self.save(&tasks)
    }

    fn get(&self, id: u64) -> Option<Task> {
        self.list.read().unwrap().iter().find(|t| t.id == id).cloned()
    }

    fn all(&self) -> Vec<Task> {
        let mut tasks = self.list.read().unwrap().clone();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendLocal;

    fn manager(dir: &tempfile::TempDir) -> TaskManagerLocal {
        let storage = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();
        TaskManagerLocal::load(Arc::new(storage)).unwrap()
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);

        let a = mgr
            .create(TaskCreate {
                title: "buy milk".into(),
                ..Default::default()
            })
            .unwrap();
        let b = mgr
            .create(TaskCreate {
                title: "buy bread".into(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.status, DEFAULT_STATUS);
    }

    #[test]
    fn test_create_requires_title() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);

        let result = mgr.create(TaskCreate {
            title: "   ".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(TaskError::TitleRequired)));
    }

    #[test]
    fn test_update_merges_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);

        let task = mgr
            .create(TaskCreate {
                title: "buy milk".into(),
                description: Some("2 liters".into()),
                ..Default::default()
            })
            .unwrap();

        let updated = mgr
            .update(
                task.id,
                TaskUpdate {
                    status: Some("done".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.status, "done");
        assert_eq!(updated.title, "buy milk");
        assert_eq!(updated.description, "2 liters");
    }

    #[test]
    fn test_update_missing_task() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);

        let result = mgr.update(42, TaskUpdate::default());
        assert!(matches!(result, Err(TaskError::NotFound(42))));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);

        let task = mgr
            .create(TaskCreate {
                title: "temp".into(),
                ..Default::default()
            })
            .unwrap();

        mgr.delete(task.id).unwrap();
        assert!(mgr.get(task.id).is_none());
        assert!(matches!(mgr.delete(task.id), Err(TaskError::NotFound(_))));
    }

    #[test]
    fn test_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mgr = manager(&dir);
            mgr.create(TaskCreate {
                title: "persisted".into(),
                ..Default::default()
            })
            .unwrap();
        }

        let mgr = manager(&dir);
        let tasks = mgr.all();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "persisted");
    }
}
