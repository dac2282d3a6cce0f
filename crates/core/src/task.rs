//! Task lifecycle rules, prompt validation, and result references.
//!
//! A task moves strictly forward: `Queued -> Running -> {Done | Failed}`.
//! `Queued -> Failed` is also allowed for tasks that never reach a
//! provider. `Done` and `Failed` are terminal.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, StatusId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Page size used by `list_by_owner` when the caller gives none (or a
/// non-positive one).
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Maximum prompt length in characters.
pub const MAX_PROMPT_LEN: usize = 4000;

/// Default retention window for terminal tasks, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Path prefix under which stored artifacts are served.
pub const ARTIFACT_PATH_PREFIX: &str = "/api/v1/artifacts";

/// Mime type assumed when a provider does not report one.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
///
/// Discriminants match the seed rows of the `task_statuses` table.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued = 1,
    Running = 2,
    Done = 3,
    Failed = 4,
}

impl TaskStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Map a database status ID back to a status. Returns `None` for
    /// unknown values.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Queued),
            2 => Some(Self::Running),
            3 => Some(Self::Done),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// `Done` and `Failed` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Done)
                | (Self::Running, Self::Failed)
        )
    }

    /// Status IDs of the terminal statuses, for SQL `IN` clauses.
    pub const TERMINAL_IDS: [StatusId; 2] = [Self::Done as StatusId, Self::Failed as StatusId];
}

impl TryFrom<StatusId> for TaskStatus {
    type Error = CoreError;

    fn try_from(value: StatusId) -> Result<Self, Self::Error> {
        Self::from_id(value)
            .ok_or_else(|| CoreError::Internal(format!("Unknown task status id {value}")))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that `from -> to` is a legal lifecycle step.
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Illegal task status transition {from} -> {to}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a submitted prompt.
///
/// Rules:
/// - Must not be empty or whitespace only.
/// - Must not exceed `MAX_PROMPT_LEN` characters.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation("prompt is required".to_string()));
    }
    if prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "prompt must not exceed {MAX_PROMPT_LEN} characters"
        )));
    }
    Ok(())
}

/// Resolve a caller-supplied list limit, falling back to
/// [`DEFAULT_LIST_LIMIT`] when absent or non-positive.
pub fn resolve_list_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 => l,
        _ => DEFAULT_LIST_LIMIT,
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Build the result reference stored on a completed task.
pub fn result_reference(artifact_id: DbId) -> String {
    format!("{ARTIFACT_PATH_PREFIX}/{artifact_id}")
}

/// Map a provider mime type to the stored format tag.
///
/// Anything that is not PNG is stored as `jpeg`.
pub fn format_for_mime(mime_type: &str) -> &'static str {
    if mime_type.eq_ignore_ascii_case("image/png") {
        "png"
    } else {
        "jpeg"
    }
}

/// Map a stored format tag back to the mime type served to clients.
pub fn mime_for_format(format: &str) -> &'static str {
    match format {
        "png" => "image/png",
        _ => DEFAULT_MIME_TYPE,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
