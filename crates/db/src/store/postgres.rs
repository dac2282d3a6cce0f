//! PostgreSQL-backed [`TaskStore`].

use async_trait::async_trait;
use renderq_core::types::{DbId, TaskId, Timestamp};

use super::{StoreError, TaskStore};
use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::task::Task;
use crate::repositories::{ArtifactRepo, TaskRepo};
use crate::DbPool;

/// Task store over a shared connection pool.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        TaskRepo::insert(&self.pool, task).await?;
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        if TaskRepo::update(&self.pool, task).await? {
            Ok(())
        } else {
            Err(StoreError::Missing {
                entity: "Task",
                id: task.id.to_string(),
            })
        }
    }

    async fn list_tasks_by_owner(
        &self,
        owner_id: DbId,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError> {
        Ok(TaskRepo::list_by_owner(&self.pool, owner_id, limit).await?)
    }

    async fn delete_terminal_tasks_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        Ok(TaskRepo::delete_terminal_before(&self.pool, cutoff).await?)
    }

    async fn insert_artifact(&self, artifact: &NewArtifact) -> Result<DbId, StoreError> {
        Ok(ArtifactRepo::create(&self.pool, artifact).await?)
    }

    async fn find_artifact(&self, id: DbId) -> Result<Option<Artifact>, StoreError> {
        Ok(ArtifactRepo::find_by_id(&self.pool, id).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("connection pool is closed".into()));
        }
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}
