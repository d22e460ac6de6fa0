//! In-process queue implementation.
//!
//! Used by tests and by deployments that run without Redis. Entries live
//! in a mutex-guarded deque; a [`Notify`] wakes one waiting consumer per
//! enqueued entry.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use darkroom_core::types::DbId;
use tokio::sync::{Mutex, Notify};

use crate::{JobQueue, QueueError};

/// FIFO queue backed by process memory.
///
/// Not durable: entries are lost when the process exits.
#[derive(Default)]
pub struct MemoryJobQueue {
    entries: Mutex<VecDeque<DbId>>,
    wakeup: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_pop(&self) -> Option<DbId> {
        self.entries.lock().await.pop_front()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job_id: DbId) -> Result<(), QueueError> {
        self.entries.lock().await.push_back(job_id);
        self.wakeup.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<DbId>, QueueError> {
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);

        loop {
            // Register for a wakeup before checking the deque, so an enqueue
            // that lands between the check and the await still wakes us.
            let notified = self.wakeup.notified();

            if let Some(id) = self.try_pop().await {
                return Ok(Some(id));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        // Deadline passed; one last look in case an entry
                        // arrived as the timeout fired.
                        return Ok(self.try_pop().await);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.entries.lock().await.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    // Test: entries come out in the order they went in.
    #[tokio::test]
    async fn dequeue_preserves_fifo_order() {
        let queue = MemoryJobQueue::new();

        for id in [7, 8, 9] {
            queue.enqueue(id).await.unwrap();
        }

        assert_eq!(queue.dequeue(Duration::from_secs(1)).await.unwrap(), Some(7));
        assert_eq!(queue.dequeue(Duration::from_secs(1)).await.unwrap(), Some(8));
        assert_eq!(queue.dequeue(Duration::from_secs(1)).await.unwrap(), Some(9));
    }

    // Test: an empty queue returns None once the timeout elapses.
    #[tokio::test]
    async fn dequeue_times_out_on_empty_queue() {
        let queue = MemoryJobQueue::new();

        let got = queue.dequeue(Duration::from_millis(20)).await.unwrap();

        assert_eq!(got, None);
    }

    // Test: a consumer blocked on an empty queue wakes when an entry arrives.
    #[tokio::test]
    async fn blocked_consumer_wakes_on_enqueue() {
        let queue = Arc::new(MemoryJobQueue::new());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(42).await.unwrap();

        assert_eq!(consumer.await.unwrap().unwrap(), Some(42));
    }

    // Test: with many consumers racing, every entry is delivered exactly once.
    #[tokio::test]
    async fn concurrent_consumers_each_receive_distinct_entries() {
        let queue = Arc::new(MemoryJobQueue::new());

        for id in 0..100 {
            queue.enqueue(id).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(id) = queue.dequeue(Duration::from_millis(50)).await.unwrap() {
                    seen.push(id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        let distinct: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 100);
        assert_eq!(distinct.len(), 100);
    }

    // Test: depth tracks enqueues and dequeues.
    #[tokio::test]
    async fn depth_reflects_pending_entries() {
        let queue = MemoryJobQueue::new();
        assert_eq!(queue.depth().await.unwrap(), 0);

        queue.enqueue(1).await.unwrap();
        queue.enqueue(2).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 2);

        queue.dequeue(Duration::from_secs(1)).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);
    }
}
