//! Domain rules shared by every renderq crate.
//!
//! No I/O lives here: only the task lifecycle, validation, dispatch
//! constants, and the domain error type.

pub mod dispatch;
pub mod error;
pub mod task;
pub mod types;
