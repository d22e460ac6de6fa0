//! The worker pool.
//!
//! Each worker is one long-lived Tokio task running the same loop:
//! dequeue an image id, process it, record the outcome, repeat. The
//! loop only exits when the pool's cancellation token fires, and it
//! checks the token between jobs so an in-flight job always finishes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use darkroom_core::notifications::{
    MSG_TYPE_IMAGE_COMPLETED, MSG_TYPE_IMAGE_FAILED, MSG_TYPE_IMAGE_PROCESSING,
};
use darkroom_core::types::DbId;
use darkroom_db::models::status::ImageStatus;
use darkroom_events::{EventBus, PipelineEvent};
use darkroom_queue::JobQueue;
use darkroom_thumbnail::Thumbnailer;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::stats::WorkerStats;
use crate::store::{JobStore, StoreError};

/// How one processing attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Completed,
    Failed,
}

/// Everything a worker task needs, shared across the pool.
struct WorkerContext {
    config: PipelineConfig,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn JobStore>,
    thumbnailer: Arc<dyn Thumbnailer>,
    event_bus: Arc<EventBus>,
    stats: Arc<WorkerStats>,
}

impl WorkerContext {
    /// Public URL for a thumbnail path relative to the storage root.
    fn thumbnail_url(&self, thumbnail_path: &str) -> String {
        format!(
            "{}/static/{}",
            self.config.public_base_url.trim_end_matches('/'),
            thumbnail_path
        )
    }
}

/// Pool of concurrent image-processing workers.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers draining `queue`.
    pub fn start(
        config: PipelineConfig,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobStore>,
        thumbnailer: Arc<dyn Thumbnailer>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let stats = Arc::new(WorkerStats::new());
        let worker_count = config.worker_count;
        let shutdown_timeout = config.shutdown_timeout;

        let context = Arc::new(WorkerContext {
            config,
            queue,
            store,
            thumbnailer,
            event_bus,
            stats: Arc::clone(&stats),
        });

        let handles = (0..worker_count)
            .map(|worker_id| {
                let context = Arc::clone(&context);
                let cancel = cancel.clone();
                tokio::spawn(run_worker(worker_id, context, cancel))
            })
            .collect();

        tracing::info!(worker_count, "Worker pool started");

        Self {
            cancel,
            handles,
            stats,
            shutdown_timeout,
        }
    }

    /// Shared counters for the stats API.
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Stop accepting work and wait for every worker to finish its
    /// current job.
    ///
    /// All workers share one deadline, `shutdown_timeout` from now. A
    /// worker still mid-transform at the deadline is detached so a
    /// single hung job cannot stall the rest of shutdown.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let mut detached = 0usize;
        for handle in self.handles {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                detached += 1;
            }
        }
        if detached > 0 {
            tracing::warn!(detached, "Workers still busy at the shutdown deadline");
        }
        tracing::info!("Worker pool stopped");
    }
}

/// The worker loop.
///
/// The shutdown check sits before the dequeue rather than racing it:
/// selecting over `dequeue` could drop an entry that was already popped
/// when cancellation won the race.
async fn run_worker(worker_id: usize, ctx: Arc<WorkerContext>, cancel: CancellationToken) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let job_id = match ctx.queue.dequeue(ctx.config.dequeue_timeout).await {
            // Timed out empty-handed; loop around to re-check the token.
            Ok(None) => continue,
            Ok(Some(id)) => id,
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "Queue unavailable, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ctx.config.retry_delay) => {}
                }
                continue;
            }
        };

        let started = Instant::now();
        match AssertUnwindSafe(process_job(&ctx, job_id)).catch_unwind().await {
            Ok(Ok(outcome)) => {
                ctx.stats
                    .record(outcome == JobOutcome::Completed, started.elapsed())
                    .await;
            }
            Ok(Err(e)) => {
                // Store connectivity lost mid-job: nothing durable was
                // recorded, so no outcome is counted either.
                tracing::warn!(worker_id, job_id, error = %e, "Job aborted, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(ctx.config.retry_delay) => {}
                }
            }
            Err(panic) => {
                tracing::error!(
                    worker_id,
                    job_id,
                    panic = %panic_message(&panic),
                    "Job processing panicked"
                );
                ctx.stats.record(false, started.elapsed()).await;
            }
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

/// Process one dequeued job end to end.
///
/// Terminal outcomes are persisted before the matching event is
/// published, so a notified client reading the row back never sees a
/// stale status.
async fn process_job(ctx: &WorkerContext, job_id: DbId) -> Result<JobOutcome, StoreError> {
    let Some(record) = ctx.store.load(job_id).await? else {
        tracing::error!(job_id, "Dequeued job has no matching image row, discarding");
        return Ok(JobOutcome::Failed);
    };

    ctx.store.mark_processing(job_id).await?;
    ctx.event_bus.publish(
        PipelineEvent::new(MSG_TYPE_IMAGE_PROCESSING)
            .with_image(record.id)
            .with_owner(record.owner_id)
            .with_payload(serde_json::json!({
                "image_id": record.id,
                "status": ImageStatus::Processing.name(),
                "file_name": record.file_name,
            })),
    );

    let source = ctx.config.storage_root.join(&record.storage_path);
    match ctx.thumbnailer.generate(&source, &record.file_name).await {
        Ok(thumbnail_path) => {
            let thumbnail_path = thumbnail_path.to_string_lossy().into_owned();
            ctx.store.complete(job_id, &thumbnail_path).await?;
            ctx.event_bus.publish(
                PipelineEvent::new(MSG_TYPE_IMAGE_COMPLETED)
                    .with_image(record.id)
                    .with_owner(record.owner_id)
                    .with_payload(serde_json::json!({
                        "image_id": record.id,
                        "status": ImageStatus::Completed.name(),
                        "file_name": record.file_name,
                        "thumbnail_url": ctx.thumbnail_url(&thumbnail_path),
                    })),
            );
            Ok(JobOutcome::Completed)
        }
        Err(e) => {
            tracing::warn!(job_id, error = %e, "Image transform failed");
            ctx.store.fail(job_id, &e.to_string()).await?;
            ctx.event_bus.publish(
                PipelineEvent::new(MSG_TYPE_IMAGE_FAILED)
                    .with_image(record.id)
                    .with_owner(record.owner_id)
                    .with_payload(serde_json::json!({
                        "image_id": record.id,
                        "status": ImageStatus::Failed.name(),
                        "file_name": record.file_name,
                        "error_info": e.to_string(),
                    })),
            );
            Ok(JobOutcome::Failed)
        }
    }
}

/// Best-effort text from a panic payload.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    }
}
