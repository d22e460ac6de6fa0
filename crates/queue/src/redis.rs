//! Redis-backed queue implementation.
//!
//! One Redis list per queue: producers RPUSH to the tail, consumers LPOP
//! from the head, so ordering is FIFO across all producers and a popped
//! entry is owned by exactly one consumer.

use std::time::Duration;

use async_trait::async_trait;
use darkroom_core::types::DbId;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::Instant;

use crate::{JobQueue, QueueError};

/// How long to sleep between empty-pop attempts while a `dequeue` call is
/// waiting for work.
///
/// A polling pop is used instead of BLPOP because every worker and the API
/// share one multiplexed [`ConnectionManager`]; a blocking command would
/// stall every other command on that connection.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Durable job queue on a single Redis list.
#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    queue_key: String,
}

impl RedisJobQueue {
    /// Connect to Redis and bind to the given list key.
    ///
    /// The [`ConnectionManager`] reconnects on its own after a dropped
    /// connection; commands issued while it is down surface as
    /// [`QueueError::Unavailable`].
    pub async fn connect(url: &str, queue_key: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(|e| QueueError::Unavailable(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        Ok(Self {
            conn,
            queue_key: queue_key.into(),
        })
    }

    /// Pop one entry if present, parsing it into a job id.
    ///
    /// A non-numeric entry is a producer bug, not an infrastructure
    /// failure: it is logged and dropped so one bad entry cannot wedge
    /// every consumer.
    async fn try_pop(&self) -> Result<Option<DbId>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .lpop(&self.queue_key, None)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        match raw {
            None => Ok(None),
            Some(entry) => match entry.parse::<DbId>() {
                Ok(id) => Ok(Some(id)),
                Err(_) => {
                    tracing::error!(queue = %self.queue_key, entry = %entry, "Discarding malformed queue entry");
                    Ok(None)
                }
            },
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job_id: DbId) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(&self.queue_key, job_id)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<DbId>, QueueError> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

        loop {
            if let Some(id) = self.try_pop().await? {
                return Ok(Some(id));
            }

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
            } else {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        conn.llen(&self.queue_key)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }
}
