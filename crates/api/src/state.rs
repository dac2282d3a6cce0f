use std::sync::Arc;

use renderq_providers::LoadBalancer;
use renderq_worker::{TaskRegistry, WorkerPool};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Task records and artifacts.
    pub registry: Arc<TaskRegistry>,
    /// Worker pool accepting submitted tasks.
    pub pool: Arc<WorkerPool>,
    /// Provider selection and health.
    pub balancer: Arc<LoadBalancer>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
