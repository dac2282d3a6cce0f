//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod artifact_repo;
pub mod task_repo;

pub use artifact_repo::ArtifactRepo;
pub use task_repo::TaskRepo;
