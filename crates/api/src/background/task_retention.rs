//! Periodic purge of finished tasks.
//!
//! Deletes `Done`/`Failed` tasks older than the retention window from the
//! store and the registry cache. Queued and running tasks are never touched.

use std::sync::Arc;
use std::time::Duration;

use renderq_worker::TaskRegistry;
use tokio_util::sync::CancellationToken;

/// Run the retention loop until `cancel` is triggered.
///
/// The first sweep runs one `interval` after startup. A failed sweep is
/// logged and retried on the next tick.
pub async fn run(
    registry: Arc<TaskRegistry>,
    retention: chrono::Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_days = retention.num_days(),
        interval_secs = interval.as_secs(),
        "Task retention job started"
    );

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                match registry.cleanup(retention).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Task retention: purged finished tasks");
                    }
                    Ok(_) => tracing::debug!("Task retention: nothing to purge"),
                    Err(e) => tracing::error!(error = %e, "Task retention: cleanup failed"),
                }
            }
        }
    }
}
