//! Task registry: a read-through cache over a [`TaskStore`].
//!
//! The store is authoritative. The cache only short-circuits status polling
//! for tasks this process has recently created or updated.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use renderq_core::error::CoreError;
use renderq_core::task::{format_for_mime, resolve_list_limit, validate_prompt};
use renderq_core::types::{DbId, TaskId};
use renderq_db::models::artifact::{Artifact, NewArtifact};
use renderq_db::models::task::Task;
use renderq_db::store::{StoreError, TaskStore};
use tokio::sync::RwLock;

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Input rejected by a domain rule (prompt, transition).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Task {0} not found")]
    NotFound(TaskId),

    #[error("Artifact {0} not found")]
    ArtifactNotFound(DbId),

    /// The backing store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Creates, tracks, and expires tasks.
pub struct TaskRegistry {
    store: Arc<dyn TaskStore>,
    cache: RwLock<HashMap<TaskId, Task>>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Validate the prompt, persist a new `Queued` task, and cache it.
    pub async fn create(&self, owner_id: DbId, prompt: &str) -> Result<Task, RegistryError> {
        validate_prompt(prompt)?;

        let task = Task::new(owner_id, prompt);
        self.store.insert_task(&task).await?;
        self.cache.write().await.insert(task.id, task.clone());

        tracing::debug!(task_id = %task.id, owner_id, "Task created");
        Ok(task)
    }

    /// Look a task up in the cache, falling back to the store.
    pub async fn get(&self, id: TaskId) -> Result<Task, RegistryError> {
        if let Some(task) = self.cache.read().await.get(&id) {
            return Ok(task.clone());
        }

        let task = self
            .store
            .find_task(id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;
        // An update that landed while the store read was in flight is newer.
        let cached = self.cache.write().await.entry(id).or_insert(task).clone();
        Ok(cached)
    }

    /// Stamp `updated_at`, write the full record, and replace the cache
    /// entry. Last writer wins.
    pub async fn update(&self, task: &mut Task) -> Result<(), RegistryError> {
        task.touch();
        self.store.update_task(task).await?;
        self.cache.write().await.insert(task.id, task.clone());
        Ok(())
    }

    /// An owner's tasks, newest first. `None` or non-positive limits fall
    /// back to the default page size.
    pub async fn list_by_owner(
        &self,
        owner_id: DbId,
        limit: Option<i64>,
    ) -> Result<Vec<Task>, RegistryError> {
        let limit = resolve_list_limit(limit);
        Ok(self.store.list_tasks_by_owner(owner_id, limit).await?)
    }

    /// Persist a generated image and return the artifact ID.
    pub async fn save_result(
        &self,
        owner_id: DbId,
        prompt: &str,
        payload: Vec<u8>,
        mime_type: &str,
    ) -> Result<DbId, RegistryError> {
        let artifact = NewArtifact {
            owner_id,
            prompt: prompt.to_string(),
            payload,
            format: format_for_mime(mime_type).to_string(),
        };
        Ok(self.store.insert_artifact(&artifact).await?)
    }

    pub async fn get_artifact(&self, id: DbId) -> Result<Artifact, RegistryError> {
        self.store
            .find_artifact(id)
            .await?
            .ok_or(RegistryError::ArtifactNotFound(id))
    }

    /// Delete terminal tasks created at or before `now - retention` from the
    /// store and the cache. Returns the number of stored rows removed.
    pub async fn cleanup(&self, retention: chrono::Duration) -> Result<u64, RegistryError> {
        let cutoff = Utc::now() - retention;
        let deleted = self.store.delete_terminal_tasks_before(cutoff).await?;

        let mut cache = self.cache.write().await;
        let cached_before = cache.len();
        cache.retain(|_, t| !(t.status.is_terminal() && t.created_at <= cutoff));
        let evicted = cached_before - cache.len();
        drop(cache);

        tracing::info!(deleted, evicted, cutoff = %cutoff, "Task cleanup complete");
        Ok(deleted)
    }

    /// Whether the backing store answers.
    pub async fn store_healthy(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Task store health check failed");
                false
            }
        }
    }
}
