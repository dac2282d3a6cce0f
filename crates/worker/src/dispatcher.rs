//! Per-task dispatch pipeline run inside a worker.
//!
//! `Queued -> Running -> provider.generate -> save artifact -> Done`, with
//! every failure recorded on the task as `Failed` plus a message. Nothing
//! here returns an error to the worker loop.

use std::sync::Arc;
use std::time::Duration;

use renderq_core::task::result_reference;
use renderq_db::models::task::Task;
use renderq_providers::provider::{call_with_deadline, GenerationRequest};
use renderq_providers::LoadBalancer;

use crate::registry::TaskRegistry;

/// Error text recorded when the balancer has no provider to offer.
pub const NO_PROVIDER_MESSAGE: &str = "no available image generation provider";

/// Runs tasks against providers and records the outcome.
pub struct TaskDispatcher {
    registry: Arc<TaskRegistry>,
    balancer: Arc<LoadBalancer>,
    generate_timeout: Duration,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<TaskRegistry>,
        balancer: Arc<LoadBalancer>,
        generate_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            balancer,
            generate_timeout,
        }
    }

    /// Drive one task to a terminal state.
    pub async fn process(&self, worker_id: usize, mut task: Task) {
        let task_id = task.id;

        if let Err(e) = task.mark_running() {
            tracing::warn!(task_id = %task_id, worker_id, error = %e, "Skipping task that cannot start");
            return;
        }
        self.persist(&mut task).await;

        let Some(selected) = self.balancer.select(task.owner_id).await else {
            tracing::error!(task_id = %task_id, worker_id, "No provider configured");
            self.fail(&mut task, NO_PROVIDER_MESSAGE).await;
            return;
        };

        tracing::info!(
            task_id = %task_id,
            worker_id,
            provider = %selected.provider.name(),
            "Dispatching task",
        );

        let request = GenerationRequest::new(task.prompt.clone());
        let timeout = self.generate_timeout;
        let image = match call_with_deadline(timeout, selected.provider.generate(&request, timeout)).await {
            Ok(image) => image,
            Err(e) => {
                tracing::error!(
                    task_id = %task_id,
                    worker_id,
                    provider = %selected.provider.name(),
                    error = %e,
                    "Generation failed",
                );
                self.fail(&mut task, &e.to_string()).await;
                return;
            }
        };

        let artifact_id = match self
            .registry
            .save_result(task.owner_id, &task.prompt, image.data, &image.mime_type)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(task_id = %task_id, worker_id, error = %e, "Failed to save result");
                self.fail(&mut task, &format!("failed to save result: {e}"))
                    .await;
                return;
            }
        };

        if let Err(e) = task.mark_done(result_reference(artifact_id)) {
            tracing::error!(task_id = %task_id, worker_id, error = %e, "Invalid completion transition");
            return;
        }
        self.persist(&mut task).await;

        tracing::info!(task_id = %task_id, worker_id, artifact_id, "Task completed");
    }

    /// Mark the task failed (if it is not terminal already) and persist.
    pub async fn fail(&self, task: &mut Task, message: &str) {
        if let Err(e) = task.mark_failed(message) {
            tracing::warn!(task_id = %task.id, error = %e, "Task already terminal");
            return;
        }
        self.persist(task).await;
    }

    async fn persist(&self, task: &mut Task) {
        if let Err(e) = self.registry.update(task).await {
            tracing::error!(
                task_id = %task.id,
                status = %task.status,
                error = %e,
                "Failed to persist task update",
            );
        }
    }
}
