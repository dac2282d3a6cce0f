#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use renderq_core::types::{DbId, TaskId, Timestamp};
use renderq_db::models::artifact::{Artifact, NewArtifact};
use renderq_db::models::task::Task;
use renderq_db::store::{InMemoryTaskStore, StoreError, TaskStore};
use renderq_providers::provider::{GeneratedImage, GenerationRequest, ImageProvider, ProviderError};
use renderq_providers::{BalanceStrategy, LoadBalancer};
use renderq_worker::{PoolConfig, TaskRegistry, WorkerPool};
use tower::ServiceExt;

use renderq_api::config::ServerConfig;
use renderq_api::router::build_app_router;
use renderq_api::state::AppState;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

pub fn test_pool_config() -> PoolConfig {
    PoolConfig {
        worker_count: 2,
        queue_capacity: 16,
        submit_timeout: Duration::from_millis(50),
        generate_timeout: Duration::from_secs(2),
    }
}

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

/// Provider that echoes the prompt back as PNG bytes after `delay`.
pub struct EchoProvider {
    pub delay: Duration,
}

#[async_trait]
impl ImageProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn ping(&self, _timeout: Duration) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _timeout: Duration,
    ) -> Result<GeneratedImage, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(GeneratedImage {
            data: request.prompt.as_bytes().to_vec(),
            mime_type: "image/png".to_string(),
        })
    }
}

pub fn echo_provider() -> Arc<dyn ImageProvider> {
    Arc::new(EchoProvider {
        delay: Duration::ZERO,
    })
}

/// Store that is permanently unreachable for health checks.
#[derive(Default)]
pub struct UnreachableStore {
    inner: InMemoryTaskStore,
}

#[async_trait]
impl TaskStore for UnreachableStore {
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

    async fn insert_artifact(&self, artifact: &NewArtifact) -> Result<DbId, StoreError> {
        self.inner.insert_artifact(artifact).await
    }

    async fn find_artifact(&self, id: DbId) -> Result<Option<Artifact>, StoreError> {
        self.inner.find_artifact(id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

// ---------------------------------------------------------------------------
// App builder
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// App over an in-memory store with the given providers and a started pool.
pub async fn build_test_app(providers: Vec<Arc<dyn ImageProvider>>) -> TestApp {
    build_test_app_with(Arc::new(InMemoryTaskStore::new()), providers, test_pool_config()).await
}

/// Fully parameterised builder. Uses the same router (and middleware stack)
/// as production.
pub async fn build_test_app_with(
    store: Arc<dyn TaskStore>,
    providers: Vec<Arc<dyn ImageProvider>>,
    pool_config: PoolConfig,
) -> TestApp {
    let config = test_config();
    let registry = Arc::new(TaskRegistry::new(store));
    let balancer = Arc::new(LoadBalancer::new(providers, BalanceStrategy::RoundRobin));
    let pool = Arc::new(WorkerPool::new(
        pool_config,
        Arc::clone(&registry),
        Arc::clone(&balancer),
    ));
    pool.start().await.expect("pool starts");

    let state = AppState {
        registry,
        pool,
        balancer,
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str, owner: Option<DbId>) -> Response<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header("x-user-id", owner.to_string());
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub async fn post_json(
    app: &TestApp,
    uri: &str,
    body: serde_json::Value,
    owner: Option<DbId>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("x-user-id", owner.to_string());
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Submit a prompt and return the new task ID.
pub async fn submit(app: &TestApp, owner: DbId, prompt: &str) -> String {
    let response = post_json(
        app,
        "/api/v1/tasks",
        serde_json::json!({ "prompt": prompt }),
        Some(owner),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);
    body_json(response).await["task_id"]
        .as_str()
        .expect("task_id is a string")
        .to_string()
}

/// Poll `GET /tasks/{id}` until the task is `DONE` or `FAILED`.
pub async fn wait_for_terminal(app: &TestApp, owner: DbId, task_id: &str) -> serde_json::Value {
    let uri = format!("/api/v1/tasks/{task_id}");
    for _ in 0..500 {
        let json = body_json(get(app, &uri, Some(owner)).await).await;
        let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
        if status == "DONE" || status == "FAILED" {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not finish in time");
}
