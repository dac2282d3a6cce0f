//! Handlers for task submission and status polling.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use renderq_core::task::TaskStatus;
use renderq_core::types::TaskId;
use renderq_db::models::task::Task;
use renderq_worker::SubmitError;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::owner::RequestOwner;
use crate::query::ListTasksParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// Error text recorded on a task rejected because the queue stayed full.
const QUEUE_FULL_MESSAGE: &str = "task queue is full";

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: &'static str,
}

// ---------------------------------------------------------------------------
// POST /tasks
// ---------------------------------------------------------------------------

/// Create a task and enqueue it for dispatch.
///
/// Returns 202 immediately; clients poll `GET /tasks/{id}` for the outcome.
/// A task the queue could not accept is recorded as `Failed` and the caller
/// receives 503.
pub async fn submit_task(
    owner: RequestOwner,
    State(state): State<AppState>,
    payload: Result<Json<SubmitTaskRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let task = state.registry.create(owner.owner_id, &input.prompt).await?;
    let task_id = task.id;

    if let Err(e) = state.pool.submit(task.clone()).await {
        reject_unqueued(&state, task, &e).await;
        return Err(e.into());
    }

    tracing::info!(task_id = %task_id, owner_id = owner.owner_id, "Task submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTaskResponse {
            task_id,
            status: TaskStatus::Queued,
            message: "Task submitted successfully",
        }),
    ))
}

/// Mark a task that never reached the queue as failed so it does not sit in
/// `Queued` forever.
async fn reject_unqueued(state: &AppState, mut task: Task, err: &SubmitError) {
    let message = match err {
        SubmitError::QueueFull { .. } => QUEUE_FULL_MESSAGE.to_string(),
        other => other.to_string(),
    };
    if task.mark_failed(message).is_ok() {
        if let Err(e) = state.registry.update(&mut task).await {
            tracing::error!(task_id = %task.id, error = %e, "Failed to record rejected task");
        }
    }
}

// ---------------------------------------------------------------------------
// GET /tasks/{id}
// ---------------------------------------------------------------------------

/// Current state of one of the caller's tasks.
pub async fn get_task(
    owner: RequestOwner,
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let task = state.registry.get(id).await?;
    owner.ensure_owns(task.owner_id, "Task")?;
    Ok(Json(DataResponse { data: task }))
}

// ---------------------------------------------------------------------------
// GET /tasks
// ---------------------------------------------------------------------------

/// The caller's tasks, newest first.
pub async fn list_tasks(
    owner: RequestOwner,
    State(state): State<AppState>,
    Query(params): Query<ListTasksParams>,
) -> AppResult<impl IntoResponse> {
    let tasks = state
        .registry
        .list_by_owner(owner.owner_id, params.limit)
        .await?;
    Ok(Json(DataResponse { data: tasks }))
}
