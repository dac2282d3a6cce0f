//! In-process [`TaskStore`] backed by hash maps.
//!
//! Mirrors the PostgreSQL semantics closely enough for tests: newest-first
//! listing, terminal-only deletion, and sequential artifact IDs starting
//! at 1.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use renderq_core::types::{DbId, TaskId, Timestamp};
use tokio::sync::RwLock;

use super::{StoreError, TaskStore};
use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::task::Task;

/// Thread-safe in-memory task and artifact storage.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    artifacts: RwLock<HashMap<DbId, Artifact>>,
    next_artifact_id: AtomicI64,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks.
    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks.get_mut(&task.id).ok_or_else(|| StoreError::Missing {
            entity: "Task",
            id: task.id.to_string(),
        })?;
        // Same columns as `TaskRepo::update`: identity fields stay put.
        stored.status = task.status;
        stored.result_ref = task.result_ref.clone();
        stored.error_message = task.error_message.clone();
        stored.updated_at = task.updated_at;
        Ok(())
    }

    async fn list_tasks_by_owner(
        &self,
        owner_id: DbId,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut owned: Vec<Task> = tasks
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        owned.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(owned)
    }

    async fn delete_terminal_tasks_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| !(t.status.is_terminal() && t.created_at <= cutoff));
        Ok((before - tasks.len()) as u64)
    }

    async fn insert_artifact(&self, artifact: &NewArtifact) -> Result<DbId, StoreError> {
        let id = self.next_artifact_id.fetch_add(1, Ordering::Relaxed) + 1;
        let row = Artifact {
            id,
            owner_id: artifact.owner_id,
            prompt: artifact.prompt.clone(),
            payload: artifact.payload.clone(),
            format: artifact.format.clone(),
            created_at: Utc::now(),
        };
        self.artifacts.write().await.insert(id, row);
        Ok(id)
    }

    async fn find_artifact(&self, id: DbId) -> Result<Option<Artifact>, StoreError> {
        Ok(self.artifacts.read().await.get(&id).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
