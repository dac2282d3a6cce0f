/// Database primary keys for users and artifacts are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Task identifiers are random UUIDs allocated by the registry.
pub type TaskId = uuid::Uuid;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
