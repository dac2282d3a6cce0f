//! Dispatch tuning constants and queue accounting.
//!
//! Pure values shared by the worker pool, the load balancer, and the API
//! configuration layer.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of concurrent worker loops when none is configured.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Bounded queue capacity when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// How long `submit` waits for queue capacity before reporting a full queue.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for a single provider `generate` call.
pub const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Interval between provider health probe rounds.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for a single provider health probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Inference steps requested from image providers.
pub const DEFAULT_INFERENCE_STEPS: u32 = 20;

/// How often the terminal task cleanup sweep runs.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// Queue accounting
// ---------------------------------------------------------------------------

/// Queue usage as a percentage of capacity, in `0.0..=100.0`.
///
/// A zero capacity reports `0.0` rather than dividing by zero.
pub fn queue_usage_percent(depth: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    (depth as f64 / capacity as f64 * 100.0).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
