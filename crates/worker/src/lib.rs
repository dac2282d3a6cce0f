//! Task registry and the worker pool that dispatches tasks to providers.

pub mod dispatcher;
pub mod pool;
pub mod registry;

pub use pool::{PoolConfig, PoolError, QueueStats, SubmitError, WorkerPool};
pub use registry::{RegistryError, TaskRegistry};
