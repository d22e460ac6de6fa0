//! Worker pool configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default bound on a single dequeue wait.
///
/// Must stay short: it is the longest an idle worker goes without
/// re-checking the shutdown signal.
const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause after a queue or store connectivity failure.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default bound on waiting for workers to drain during shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning knobs for the worker pool.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent worker tasks.
    pub worker_count: usize,

    /// Upper bound on a single blocking dequeue. Never zero: a zero
    /// timeout waits indefinitely and would make shutdown unresponsive.
    pub dequeue_timeout: Duration,

    /// How long a worker backs off after infrastructure errors.
    pub retry_delay: Duration,

    /// Upper bound on `shutdown` waiting for in-flight jobs. A worker
    /// still busy at the deadline is detached rather than joined.
    pub shutdown_timeout: Duration,

    /// Root directory holding stored originals and thumbnails.
    pub storage_root: PathBuf,

    /// External base URL used to build thumbnail links in notifications.
    pub public_base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            storage_root: PathBuf::from("uploads"),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}
