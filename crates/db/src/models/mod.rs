//! Row types for the `tasks` and `artifacts` tables.

pub mod artifact;
pub mod task;
