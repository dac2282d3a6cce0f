//! Task entity: one unit of queued image generation work.

use chrono::Utc;
use renderq_core::error::CoreError;
use renderq_core::task::{validate_transition, TaskStatus};
use renderq_core::types::{DbId, TaskId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub owner_id: DbId,
    pub prompt: String,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: TaskStatus,
    pub result_ref: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Build a fresh `Queued` task with a new random identifier.
    pub fn new(owner_id: DbId, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new_v4(),
            owner_id,
            prompt: prompt.into(),
            status: TaskStatus::Queued,
            result_ref: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stamp `updated_at` with the current time, never earlier than
    /// `created_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.created_at);
    }

    /// `Queued -> Running`.
    pub fn mark_running(&mut self) -> Result<(), CoreError> {
        self.transition(TaskStatus::Running)
    }

    /// `Running -> Done`, recording where the result can be fetched.
    pub fn mark_done(&mut self, result_ref: impl Into<String>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Done)?;
        self.result_ref = Some(result_ref.into());
        self.error_message = None;
        Ok(())
    }

    /// `Queued | Running -> Failed`, recording the reason.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Failed)?;
        self.result_ref = None;
        self.error_message = Some(error.into());
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), CoreError> {
        validate_transition(self.status, next)?;
        self.status = next;
        self.touch();
        Ok(())
    }
}
