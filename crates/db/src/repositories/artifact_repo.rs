//! Repository for the `artifacts` table (generated images).

use renderq_core::types::DbId;
use sqlx::PgPool;

use crate::models::artifact::{Artifact, NewArtifact};

/// Column list for `artifacts` SELECT queries.
const COLUMNS: &str = "id, owner_id, prompt, payload, format, created_at";

/// Provides insert and lookup for generated artifacts.
pub struct ArtifactRepo;

impl ArtifactRepo {
    /// Insert an artifact and return its generated ID.
    pub async fn create(pool: &PgPool, input: &NewArtifact) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO artifacts (owner_id, prompt, payload, format) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(input.owner_id)
        .bind(&input.prompt)
        .bind(&input.payload)
        .bind(&input.format)
        .fetch_one(pool)
        .await
    }

    /// Find an artifact by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Artifact>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM artifacts WHERE id = $1");
        sqlx::query_as::<_, Artifact>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
