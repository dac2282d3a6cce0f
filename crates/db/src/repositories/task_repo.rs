//! Repository for the `tasks` table.
//!
//! Status values are bound through `TaskStatus::id()`; no raw status
//! literals appear in the SQL.

use renderq_core::task::TaskStatus;
use renderq_core::types::{DbId, TaskId, Timestamp};
use sqlx::PgPool;

use crate::models::task::Task;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, owner_id, prompt, status_id, result_ref, error_message, \
    created_at, updated_at";

/// Provides CRUD operations for tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new task row exactly as given.
    pub async fn insert(pool: &PgPool, task: &Task) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task.id)
            .bind(task.owner_id)
            .bind(&task.prompt)
            .bind(task.status.id())
            .bind(&task.result_ref)
            .bind(&task.error_message)
            .bind(task.created_at)
            .bind(task.updated_at)
            .fetch_one(pool)
            .await
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: TaskId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite the mutable columns of a task.
    ///
    /// Owner, prompt, and `created_at` are never rewritten. Returns `true`
    /// if a row was updated.
    pub async fn update(pool: &PgPool, task: &Task) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, result_ref = $3, error_message = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(task.id)
        .bind(task.status.id())
        .bind(&task.result_ref)
        .bind(&task.error_message)
        .bind(task.updated_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List an owner's tasks, newest first.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        limit: i64,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE owner_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(owner_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete terminal tasks created at or before `cutoff`.
    ///
    /// Returns the number of deleted rows.
    pub async fn delete_terminal_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE created_at <= $1 AND status_id IN ($2, $3)",
        )
        .bind(cutoff)
        .bind(TaskStatus::TERMINAL_IDS[0])
        .bind(TaskStatus::TERMINAL_IDS[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
