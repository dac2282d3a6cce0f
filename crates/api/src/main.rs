use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use renderq_db::store::{InMemoryTaskStore, PgTaskStore, TaskStore};
use renderq_providers::{HttpImageProvider, ImageProvider, LoadBalancer};
use renderq_worker::{TaskRegistry, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use renderq_api::background;
use renderq_api::config::{DispatchConfig, ServerConfig};
use renderq_api::router::build_app_router;
use renderq_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "renderq_api=debug,renderq_worker=debug,renderq_providers=debug,tower_http=debug"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let dispatch = DispatchConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        providers = dispatch.provider_urls.len(),
        strategy = ?dispatch.strategy,
        workers = dispatch.worker_count,
        queue_capacity = dispatch.queue_capacity,
        "Loaded dispatch configuration",
    );

    // --- Task store ---
    let store = build_store().await;

    // --- Providers ---
    let http = reqwest_client();
    let providers: Vec<Arc<dyn ImageProvider>> = dispatch
        .provider_urls
        .iter()
        .map(|url| {
            let provider = HttpImageProvider::with_client(http.clone(), url)
                .unwrap_or_else(|e| panic!("Invalid provider URL '{url}': {e}"));
            Arc::new(provider) as Arc<dyn ImageProvider>
        })
        .collect();
    let balancer = Arc::new(LoadBalancer::new(providers, dispatch.strategy));

    // --- Registry and worker pool ---
    let registry = Arc::new(TaskRegistry::new(store));
    let pool = Arc::new(WorkerPool::new(
        dispatch.pool_config(),
        Arc::clone(&registry),
        Arc::clone(&balancer),
    ));
    pool.start().await.expect("Failed to start worker pool");

    // --- Background jobs ---
    let background_cancel = CancellationToken::new();
    let health_handle = tokio::spawn(
        Arc::clone(&balancer).run_health_checks(background_cancel.child_token()),
    );
    let retention_handle = tokio::spawn(background::task_retention::run(
        Arc::clone(&registry),
        dispatch.retention(),
        dispatch.cleanup_interval,
        background_cancel.child_token(),
    ));

    // --- App state ---
    let state = AppState {
        registry,
        pool: Arc::clone(&pool),
        balancer,
        config: Arc::new(config.clone()),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    // Workers first: in-flight generations finish, queued tasks are failed.
    if tokio::time::timeout(drain_timeout, pool.stop()).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Worker pool did not stop in time"
        );
    }

    background_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Background jobs stopped");

    tracing::info!("Graceful shutdown complete");
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise the in-memory store
/// (local development only; nothing survives a restart).
async fn build_store() -> Arc<dyn TaskStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL not set, using in-memory task store");
        return Arc::new(InMemoryTaskStore::new());
    };

    let pool = renderq_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    renderq_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    renderq_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    Arc::new(PgTaskStore::new(pool))
}

/// Shared HTTP client for all provider connections.
fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .expect("Failed to build HTTP client")
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
