//! Durable FIFO job queue shared by the upload path (producer) and the
//! worker pool (consumers).
//!
//! The queue carries bare job identifiers; everything else about a job
//! lives in the persistence store. Two implementations exist:
//!
//! - [`RedisJobQueue`] -- the production backing, one Redis list per queue.
//! - [`MemoryJobQueue`] -- in-process, for tests and single-node development.

use std::time::Duration;

use async_trait::async_trait;
use darkroom_core::types::DbId;

pub mod memory;
pub mod redis;

pub use memory::MemoryJobQueue;
pub use redis::RedisJobQueue;

/// Default list key for the image pipeline.
pub const DEFAULT_QUEUE_KEY: &str = "darkroom:jobs";

/// Errors surfaced by a queue implementation.
///
/// The queue has exactly one failure mode toward callers: the backing
/// store cannot be reached or rejected the command. Producers map this to
/// a 503; consumers back off and retry.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Multi-producer / multi-consumer FIFO handoff of job ids.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job id to the tail. Never blocks beyond the call itself.
    async fn enqueue(&self, job_id: DbId) -> Result<(), QueueError>;

    /// Remove and return the head entry.
    ///
    /// Blocks up to `timeout` while the queue is empty and returns
    /// `Ok(None)` when the timeout expires, so consumers can re-check
    /// their shutdown signal. A zero `timeout` waits indefinitely.
    ///
    /// Each entry is delivered to exactly one caller.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<DbId>, QueueError>;

    /// Number of entries currently waiting.
    async fn depth(&self) -> Result<u64, QueueError>;
}
