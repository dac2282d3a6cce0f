//! Download of generated artifacts referenced by `result_ref`.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use renderq_core::task::mime_for_format;
use renderq_core::types::DbId;

use crate::error::AppResult;
use crate::middleware::owner::RequestOwner;
use crate::state::AppState;

/// GET /artifacts/{id} -- raw image bytes with their content type.
pub async fn get_artifact(
    owner: RequestOwner,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let artifact = state.registry.get_artifact(id).await?;
    owner.ensure_owns(artifact.owner_id, "Artifact")?;

    Ok((
        [(header::CONTENT_TYPE, mime_for_format(&artifact.format))],
        artifact.payload,
    ))
}
