use axum::routing::get;
use axum::Router;

use crate::handlers::artifacts;
use crate::state::AppState;

/// Routes mounted at `/artifacts`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(artifacts::get_artifact))
}
