//! Dispatch statistics.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use renderq_providers::BalancerStats;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub queue_length: usize,
    pub queue_capacity: usize,
    /// Percentage of the queue in use.
    pub queue_usage: f64,
    pub workers: usize,
    pub pool_running: bool,
    pub providers: BalancerStats,
}

/// GET /system/stats
pub async fn get_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let queue = state.pool.queue_stats().await;
    let stats = SystemStats {
        queue_length: queue.length,
        queue_capacity: queue.capacity,
        queue_usage: queue.usage_percent,
        workers: state.pool.config().worker_count,
        pool_running: state.pool.is_running().await,
        providers: state.balancer.stats().await,
    };
    Ok(Json(DataResponse { data: stats }))
}
