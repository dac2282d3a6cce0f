pub mod artifacts;
pub mod health;
pub mod system;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /tasks                  submit (POST), list own tasks (GET)
/// /tasks/{id}             task status (GET)
///
/// /artifacts/{id}         generated image bytes (GET)
///
/// /system/stats           queue and provider statistics (GET)
/// ```
///
/// Task and artifact routes require the `X-User-Id` header.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/tasks", tasks::router())
        .nest("/artifacts", artifacts::router())
        .nest("/system", system::router())
}
