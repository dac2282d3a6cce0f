//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use renderq_core::types::{DbId, TaskId, Timestamp};
use renderq_db::models::artifact::{Artifact, NewArtifact};
use renderq_db::models::task::Task;
use renderq_db::store::{InMemoryTaskStore, StoreError, TaskStore};
use renderq_providers::provider::{GeneratedImage, GenerationRequest, ImageProvider, ProviderError};
use renderq_providers::{BalanceStrategy, LoadBalancer};
use renderq_worker::{PoolConfig, TaskRegistry, WorkerPool};

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// What a [`StubProvider`] does when asked to generate.
#[derive(Clone)]
pub enum StubBehaviour {
    /// Echo the prompt bytes back as a PNG after `delay`.
    Succeed { delay: Duration },
    /// Fail with a provider API error.
    Fail { status: u16, body: String },
    /// Never answer.
    Hang,
}

pub struct StubProvider {
    name: String,
    behaviour: StubBehaviour,
}

impl StubProvider {
    pub fn succeeding() -> Arc<dyn ImageProvider> {
        Self::with(StubBehaviour::Succeed {
            delay: Duration::ZERO,
        })
    }

    pub fn slow(delay: Duration) -> Arc<dyn ImageProvider> {
        Self::with(StubBehaviour::Succeed { delay })
    }

    pub fn failing(status: u16, body: &str) -> Arc<dyn ImageProvider> {
        Self::with(StubBehaviour::Fail {
            status,
            body: body.to_string(),
        })
    }

    pub fn hanging() -> Arc<dyn ImageProvider> {
        Self::with(StubBehaviour::Hang)
    }

    fn with(behaviour: StubBehaviour) -> Arc<dyn ImageProvider> {
        Arc::new(Self {
            name: "stub".to_string(),
            behaviour,
        })
    }
}

#[async_trait]
impl ImageProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self, _timeout: Duration) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _timeout: Duration,
    ) -> Result<GeneratedImage, ProviderError> {
        match &self.behaviour {
            StubBehaviour::Succeed { delay } => {
                tokio::time::sleep(*delay).await;
                Ok(GeneratedImage {
                    data: request.prompt.as_bytes().to_vec(),
                    mime_type: "image/png".to_string(),
                })
            }
            StubBehaviour::Fail { status, body } => Err(ProviderError::Api {
                status: *status,
                body: body.clone(),
            }),
            StubBehaviour::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// In-memory store whose artifact writes always fail.
#[derive(Default)]
pub struct ArtifactlessStore {
    inner: InMemoryTaskStore,
}

#[async_trait]
impl TaskStore for ArtifactlessStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.inner.insert_task(task).await
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.find_task(id).await
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        self.inner.update_task(task).await
    }

    async fn list_tasks_by_owner(
        &self,
        owner_id: DbId,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError> {
        self.inner.list_tasks_by_owner(owner_id, limit).await
    }

    async fn delete_terminal_tasks_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        self.inner.delete_terminal_tasks_before(cutoff).await
    }

    async fn insert_artifact(&self, _artifact: &NewArtifact) -> Result<DbId, StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn find_artifact(&self, id: DbId) -> Result<Option<Artifact>, StoreError> {
        self.inner.find_artifact(id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub registry: Arc<TaskRegistry>,
    pub balancer: Arc<LoadBalancer>,
    pub pool: WorkerPool,
}

/// Fast deadlines so failure paths finish quickly.
pub fn test_config() -> PoolConfig {
    PoolConfig {
        worker_count: 2,
        queue_capacity: 16,
        submit_timeout: Duration::from_millis(50),
        generate_timeout: Duration::from_millis(500),
    }
}

pub fn harness(providers: Vec<Arc<dyn ImageProvider>>, config: PoolConfig) -> Harness {
    harness_with_store(Arc::new(InMemoryTaskStore::new()), providers, config)
}

pub fn harness_with_store(
    store: Arc<dyn TaskStore>,
    providers: Vec<Arc<dyn ImageProvider>>,
    config: PoolConfig,
) -> Harness {
    let registry = Arc::new(TaskRegistry::new(store));
    let balancer = Arc::new(LoadBalancer::new(providers, BalanceStrategy::RoundRobin));
    let pool = WorkerPool::new(config, Arc::clone(&registry), Arc::clone(&balancer));
    Harness {
        registry,
        balancer,
        pool,
    }
}

/// Poll until the task leaves `Queued`/`Running` or the deadline passes.
pub async fn wait_for_terminal(registry: &TaskRegistry, id: TaskId) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = registry.get(id).await.expect("task should exist");
        if task.status.is_terminal() {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} still {} after 5s",
            task.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the task reaches `Running`.
pub async fn wait_until_running(registry: &TaskRegistry, id: TaskId) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = registry.get(id).await.expect("task should exist");
        if task.status == renderq_core::task::TaskStatus::Running {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "task {id} never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
