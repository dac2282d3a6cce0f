//! Storage abstraction for tasks and artifacts.
//!
//! The registry and worker pool only ever talk to a [`TaskStore`]; swapping
//! PostgreSQL for the in-memory backend touches nothing above this module.
//!
//! - [`PgTaskStore`](postgres::PgTaskStore) delegates to the sqlx
//!   repositories.
//! - [`InMemoryTaskStore`](memory::InMemoryTaskStore) keeps everything in
//!   process and is used by tests and database-less development runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use renderq_core::types::{DbId, TaskId, Timestamp};

use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::task::Task;

pub use memory::InMemoryTaskStore;
pub use postgres::PgTaskStore;

/// Errors raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database rejected or failed the query.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An update targeted a record that does not exist.
    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: String },

    /// The backend is unavailable for a reason other than a query error,
    /// e.g. its connection pool has been closed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for task records and generated artifacts.
///
/// Implementations serialise their own writes per record; callers never
/// hold a lock across calls.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a newly created task.
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Load a task by ID.
    async fn find_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Overwrite a task's mutable fields. Fails with
    /// [`StoreError::Missing`] if the task does not exist.
    async fn update_task(&self, task: &Task) -> Result<(), StoreError>;

    /// An owner's tasks, newest first, at most `limit` rows.
    async fn list_tasks_by_owner(&self, owner_id: DbId, limit: i64)
        -> Result<Vec<Task>, StoreError>;

    /// Delete terminal tasks created at or before `cutoff`; returns the
    /// number removed.
    async fn delete_terminal_tasks_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;

    /// Persist a generated artifact and return its ID.
    async fn insert_artifact(&self, artifact: &NewArtifact) -> Result<DbId, StoreError>;

    /// Load an artifact by ID.
    async fn find_artifact(&self, id: DbId) -> Result<Option<Artifact>, StoreError>;

    /// Cheap readiness check for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
