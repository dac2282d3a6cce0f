//! Generated output persisted for a completed task.

use renderq_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `artifacts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Artifact {
    pub id: DbId,
    pub owner_id: DbId,
    pub prompt: String,
    /// Raw image bytes; served by the artifact endpoint, never inlined in JSON.
    #[serde(skip)]
    pub payload: Vec<u8>,
    /// Format tag (`png` or `jpeg`).
    pub format: String,
    pub created_at: Timestamp,
}

/// Input for inserting a new artifact.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub owner_id: DbId,
    pub prompt: String,
    pub payload: Vec<u8>,
    pub format: String,
}
