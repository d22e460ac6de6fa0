//! Image processing pipeline: the worker pool that drains the job queue.
//!
//! Workers dequeue image ids, load the matching row, run the thumbnail
//! transform, persist the outcome, and publish progress events on the
//! shared [`darkroom_events::EventBus`]. The pool is cooperative: a
//! cancellation token stops every worker at its next iteration boundary
//! without abandoning a job mid-flight.

pub mod config;
pub mod pool;
pub mod stats;
pub mod store;

pub use config::PipelineConfig;
pub use pool::WorkerPool;
pub use stats::{WorkerStats, WorkerStatsSnapshot};
pub use store::{JobRecord, JobStore, PgJobStore, StoreError};
