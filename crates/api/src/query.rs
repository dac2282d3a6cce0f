//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// `?limit=` for task listing. Missing or non-positive values fall back to
/// the default page size in the registry.
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksParams {
    pub limit: Option<i64>,
}
