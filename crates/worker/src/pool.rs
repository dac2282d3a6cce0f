//! Bounded worker pool.
//!
//! Tasks travel through a bounded `mpsc` queue to `worker_count` tokio
//! workers sharing the receiver. Lifecycle:
//!
//! ```text
//! Stopped --start--> Running --stop--> Stopping --(workers joined)--> Stopped
//! ```
//!
//! Stopping cancels the shared token, drops the intake sender, and waits
//! for every worker. A task already inside the pipeline runs to completion
//! (bounded by the generate deadline); tasks still queued at that point are
//! marked `Failed` so no record is left `Queued` forever.

use std::sync::Arc;
use std::time::Duration;

use renderq_core::dispatch::{
    queue_usage_percent, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT, GENERATE_TIMEOUT,
    SUBMIT_TIMEOUT,
};
use renderq_db::models::task::Task;
use renderq_providers::LoadBalancer;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::TaskDispatcher;
use crate::registry::TaskRegistry;

/// Error text recorded on tasks left in the queue when the pool stops.
pub const POOL_STOPPED_MESSAGE: &str = "worker pool stopped before the task was dispatched";

/// Pool sizing and deadlines.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// How long `submit` waits for queue space.
    pub submit_timeout: Duration,
    /// Deadline for one provider `generate` call.
    pub generate_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            submit_timeout: SUBMIT_TIMEOUT,
            generate_timeout: GENERATE_TIMEOUT,
        }
    }
}

/// Lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool is already running")]
    AlreadyRunning,

    #[error("Worker pool is stopping")]
    Stopping,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// Errors returned to a submitter.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// No queue space freed up within the submit timeout.
    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Worker pool is not running")]
    NotRunning,
}

/// Queue depth snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueStats {
    pub length: usize,
    pub capacity: usize,
    /// `length / capacity * 100`.
    pub usage_percent: f64,
}

enum PoolState {
    Stopped,
    Running(RunningPool),
    Stopping,
}

struct RunningPool {
    sender: mpsc::Sender<Task>,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

/// Fixed-size pool of task workers.
pub struct WorkerPool {
    config: PoolConfig,
    dispatcher: Arc<TaskDispatcher>,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub fn new(
        config: PoolConfig,
        registry: Arc<TaskRegistry>,
        balancer: Arc<LoadBalancer>,
    ) -> Self {
        let dispatcher = Arc::new(TaskDispatcher::new(
            registry,
            balancer,
            config.generate_timeout,
        ));
        Self {
            config,
            dispatcher,
            state: Mutex::new(PoolState::Stopped),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Spawn the workers. Fails if the pool is running or still stopping.
    pub async fn start(&self) -> Result<(), PoolError> {
        if self.config.worker_count == 0 {
            return Err(PoolError::InvalidConfig("worker_count must be at least 1".into()));
        }
        if self.config.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig("queue_capacity must be at least 1".into()));
        }

        let mut state = self.state.lock().await;
        match *state {
            PoolState::Running(_) => return Err(PoolError::AlreadyRunning),
            PoolState::Stopping => return Err(PoolError::Stopping),
            PoolState::Stopped => {}
        }

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let workers = (0..self.config.worker_count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&receiver),
                    cancel.child_token(),
                    Arc::clone(&self.dispatcher),
                ))
            })
            .collect();

        *state = PoolState::Running(RunningPool {
            sender,
            receiver,
            cancel,
            workers,
        });

        tracing::info!(
            workers = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            "Worker pool started",
        );
        Ok(())
    }

    /// Cancel workers, close intake, and wait for every worker to exit.
    /// A no-op when the pool is not running.
    pub async fn stop(&self) {
        let running = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, PoolState::Stopping) {
                PoolState::Running(running) => running,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        tracing::info!("Stopping worker pool");
        let RunningPool {
            sender,
            receiver,
            cancel,
            workers,
        } = running;

        cancel.cancel();
        drop(sender);
        for (worker_id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                tracing::error!(worker_id, error = %e, "Worker exited abnormally");
            }
        }

        let mut abandoned = 0usize;
        {
            let mut rx = receiver.lock().await;
            rx.close();
            while let Ok(mut task) = rx.try_recv() {
                self.dispatcher.fail(&mut task, POOL_STOPPED_MESSAGE).await;
                abandoned += 1;
            }
        }

        *self.state.lock().await = PoolState::Stopped;
        tracing::info!(abandoned, "Worker pool stopped");
    }

    /// Enqueue a task, waiting up to the submit timeout for space.
    pub async fn submit(&self, task: Task) -> Result<(), SubmitError> {
        let sender = match &*self.state.lock().await {
            PoolState::Running(running) => running.sender.clone(),
            _ => return Err(SubmitError::NotRunning),
        };

        let task_id = task.id;
        match sender.send_timeout(task, self.config.submit_timeout).await {
            Ok(()) => {
                tracing::debug!(task_id = %task_id, "Task queued");
                Ok(())
            }
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    task_id = %task_id,
                    capacity = self.config.queue_capacity,
                    "Task queue full",
                );
                Err(SubmitError::QueueFull {
                    capacity: self.config.queue_capacity,
                })
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(SubmitError::NotRunning),
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, PoolState::Running(_))
    }

    /// Number of tasks waiting in the queue (0 when not running).
    pub async fn queue_depth(&self) -> usize {
        match &*self.state.lock().await {
            PoolState::Running(running) => running.sender.max_capacity() - running.sender.capacity(),
            _ => 0,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }

    pub async fn queue_stats(&self) -> QueueStats {
        let length = self.queue_depth().await;
        let capacity = self.queue_capacity();
        QueueStats {
            length,
            capacity,
            usage_percent: queue_usage_percent(length, capacity),
        }
    }
}

/// Pull tasks until cancelled or the queue closes and drains.
async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    cancel: CancellationToken,
    dispatcher: Arc<TaskDispatcher>,
) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = async { receiver.lock().await.recv().await } => task,
        };

        match next {
            Some(task) => dispatcher.process(worker_id, task).await,
            None => break,
        }
    }

    tracing::debug!(worker_id, "Worker exiting");
}
