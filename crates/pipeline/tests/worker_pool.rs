//! Integration tests for `WorkerPool`.
//!
//! These tests drive the pool against an in-memory queue, a scripted
//! thumbnailer, and a recording job store, so the full dequeue/process/
//! persist/notify cycle runs without Postgres, Redis, or real image
//! files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use darkroom_core::types::DbId;
use darkroom_events::{EventBus, PipelineEvent};
use darkroom_pipeline::{JobRecord, JobStore, PipelineConfig, StoreError, WorkerPool, WorkerStats};
use darkroom_queue::{JobQueue, MemoryJobQueue, QueueError};
use darkroom_thumbnail::{ThumbnailError, Thumbnailer};
use tokio::sync::broadcast;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// How the scripted thumbnailer should treat a given file name.
#[derive(Clone)]
enum Transform {
    Succeed,
    FailWith(&'static str),
    Panic,
    /// Sleep before succeeding, to hold a job in flight.
    Delay(Duration),
    /// Never return, to model a transform that is stuck for good.
    Hang,
}

/// Thumbnailer that acts out a per-file script instead of decoding
/// anything.
struct ScriptedThumbnailer {
    script: HashMap<String, Transform>,
}

impl ScriptedThumbnailer {
    fn new(script: impl IntoIterator<Item = (&'static str, Transform)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(name, transform)| (name.to_string(), transform))
                .collect(),
        }
    }

    fn always_succeeding() -> Self {
        Self {
            script: HashMap::new(),
        }
    }
}

#[async_trait]
impl Thumbnailer for ScriptedThumbnailer {
    async fn generate(&self, _source: &Path, file_name: &str) -> Result<PathBuf, ThumbnailError> {
        match self.script.get(file_name).unwrap_or(&Transform::Succeed) {
            Transform::Succeed => {}
            Transform::FailWith(message) => {
                return Err(ThumbnailError::Decode((*message).to_string()))
            }
            Transform::Panic => panic!("scripted panic for {file_name}"),
            Transform::Delay(delay) => tokio::time::sleep(*delay).await,
            Transform::Hang => std::future::pending::<()>().await,
        }
        Ok(PathBuf::from("thumbnails").join(format!("thumb-{file_name}.jpg")))
    }
}

/// Terminal state a fake job ends up in.
#[derive(Debug, Clone, PartialEq, Eq)]
enum JobState {
    Queued,
    Processing,
    Completed { thumbnail_path: String },
    Failed { error_info: String },
}

struct FakeJob {
    record: JobRecord,
    state: JobState,
    /// Number of times a worker called `mark_processing` for this job.
    pickups: u32,
}

/// In-memory `JobStore` that remembers every transition.
#[derive(Default)]
struct RecordingStore {
    jobs: Mutex<HashMap<DbId, FakeJob>>,
}

impl RecordingStore {
    fn new() -> Self {
        Self::default()
    }

    async fn seed(&self, id: DbId, owner_id: DbId, file_name: &str) {
        self.jobs.lock().await.insert(
            id,
            FakeJob {
                record: JobRecord {
                    id,
                    owner_id,
                    file_name: file_name.to_string(),
                    storage_path: format!("originals/{file_name}"),
                },
                state: JobState::Queued,
                pickups: 0,
            },
        );
    }

    async fn state_of(&self, id: DbId) -> Option<JobState> {
        self.jobs.lock().await.get(&id).map(|job| job.state.clone())
    }

    async fn pickups_of(&self, id: DbId) -> u32 {
        self.jobs
            .lock()
            .await
            .get(&id)
            .map(|job| job.pickups)
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn load(&self, id: DbId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .await
            .get(&id)
            .map(|job| job.record.clone()))
    }

    async fn mark_processing(&self, id: DbId) -> Result<(), StoreError> {
        if let Some(job) = self.jobs.lock().await.get_mut(&id) {
            job.state = JobState::Processing;
            job.pickups += 1;
        }
        Ok(())
    }

    async fn complete(&self, id: DbId, thumbnail_path: &str) -> Result<(), StoreError> {
        if let Some(job) = self.jobs.lock().await.get_mut(&id) {
            job.state = JobState::Completed {
                thumbnail_path: thumbnail_path.to_string(),
            };
        }
        Ok(())
    }

    async fn fail(&self, id: DbId, error_info: &str) -> Result<(), StoreError> {
        if let Some(job) = self.jobs.lock().await.get_mut(&id) {
            job.state = JobState::Failed {
                error_info: error_info.to_string(),
            };
        }
        Ok(())
    }
}

/// Queue wrapper whose first `failures` dequeues report unavailability.
struct FlakyQueue {
    inner: MemoryJobQueue,
    remaining_failures: AtomicU32,
}

impl FlakyQueue {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryJobQueue::new(),
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn enqueue(&self, job_id: DbId) -> Result<(), QueueError> {
        self.inner.enqueue(job_id).await
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<DbId>, QueueError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .remaining_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(QueueError::Unavailable("connection refused".to_string()));
        }
        self.inner.dequeue(timeout).await
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        self.inner.depth().await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pool configuration with timeouts short enough for tests.
fn fast_config(worker_count: usize) -> PipelineConfig {
    PipelineConfig {
        worker_count,
        dequeue_timeout: Duration::from_millis(50),
        retry_delay: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(5),
        storage_root: PathBuf::from("/nonexistent"),
        public_base_url: "http://localhost:8080".to_string(),
    }
}

/// Wait until the pool has processed at least `expected` jobs.
async fn wait_for_processed(stats: &WorkerStats, expected: u64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if stats.snapshot().await.total_processed >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for jobs to be processed");
}

/// Receive the next event or fail the test after a timeout.
async fn next_event(rx: &mut broadcast::Receiver<PipelineEvent>) -> PipelineEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event bus closed unexpectedly")
}

// ---------------------------------------------------------------------------
// Test: a successful job emits processing then completed, in that order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_job_emits_processing_then_completed() {
    let queue = Arc::new(MemoryJobQueue::new());
    let store = Arc::new(RecordingStore::new());
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();

    store.seed(42, 7, "photo.png").await;
    queue.enqueue(42).await.unwrap();

    let pool = WorkerPool::start(
        fast_config(1),
        queue,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(ScriptedThumbnailer::always_succeeding()),
        Arc::clone(&bus),
    );
    let stats = pool.stats();

    let first = next_event(&mut events).await;
    assert_eq!(first.event_type, "image.processing");
    assert_eq!(first.image_id, Some(42));
    assert_eq!(first.owner_id, Some(7));

    let second = next_event(&mut events).await;
    assert_eq!(second.event_type, "image.completed");
    assert_eq!(second.image_id, Some(42));
    assert_eq!(second.owner_id, Some(7));
    assert_eq!(second.payload["image_id"], 42);
    assert_eq!(second.payload["status"], "completed");
    let url = second.payload["thumbnail_url"]
        .as_str()
        .expect("completed event carries a thumbnail_url");
    assert!(url.starts_with("http://localhost:8080/static/thumbnails/"));

    wait_for_processed(&stats, 1).await;
    let snapshot = stats.snapshot().await;
    assert_eq!(snapshot.success_count, 1);
    assert_eq!(snapshot.failure_count, 0);

    assert!(matches!(
        store.state_of(42).await,
        Some(JobState::Completed { .. })
    ));

    pool.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a failed transform persists the failure and emits image.failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_transform_marks_job_failed() {
    let queue = Arc::new(MemoryJobQueue::new());
    let store = Arc::new(RecordingStore::new());
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();

    store.seed(43, 9, "broken.gif").await;
    queue.enqueue(43).await.unwrap();

    let pool = WorkerPool::start(
        fast_config(1),
        queue,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(ScriptedThumbnailer::new([(
            "broken.gif",
            Transform::FailWith("unsupported image format"),
        )])),
        Arc::clone(&bus),
    );
    let stats = pool.stats();

    let first = next_event(&mut events).await;
    assert_eq!(first.event_type, "image.processing");

    let second = next_event(&mut events).await;
    assert_eq!(second.event_type, "image.failed");
    assert_eq!(second.owner_id, Some(9));
    assert_eq!(second.payload["status"], "failed");
    let error = second.payload["error_info"].as_str().unwrap_or_default();
    assert!(error.contains("unsupported image format"));

    wait_for_processed(&stats, 1).await;
    let snapshot = stats.snapshot().await;
    assert_eq!(snapshot.success_count, 0);
    assert_eq!(snapshot.failure_count, 1);

    match store.state_of(43).await {
        Some(JobState::Failed { error_info }) => {
            assert!(error_info.contains("unsupported image format"));
        }
        other => panic!("expected Failed state, got {other:?}"),
    }

    pool.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a dequeued id with no matching row is discarded, not retried
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_is_discarded_and_counted_as_failure() {
    let queue = Arc::new(MemoryJobQueue::new());
    let store = Arc::new(RecordingStore::new());
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();

    // Enqueued but never seeded in the store.
    queue.enqueue(99).await.unwrap();

    let pool = WorkerPool::start(
        fast_config(1),
        Arc::clone(&queue) as Arc<dyn JobQueue>,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(ScriptedThumbnailer::always_succeeding()),
        Arc::clone(&bus),
    );
    let stats = pool.stats();

    wait_for_processed(&stats, 1).await;
    let snapshot = stats.snapshot().await;
    assert_eq!(snapshot.total_processed, 1);
    assert_eq!(snapshot.failure_count, 1);

    // The entry is gone from the queue and produced no notifications.
    assert_eq!(queue.depth().await.unwrap(), 0);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    pool.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: four workers drain a thousand jobs, each processed exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn four_workers_drain_a_thousand_jobs_exactly_once() {
    let queue = Arc::new(MemoryJobQueue::new());
    let store = Arc::new(RecordingStore::new());
    let bus = Arc::new(EventBus::default());

    for id in 1..=1000 {
        store.seed(id, id % 10, &format!("img-{id}.png")).await;
        queue.enqueue(id).await.unwrap();
    }

    let pool = WorkerPool::start(
        fast_config(4),
        Arc::clone(&queue) as Arc<dyn JobQueue>,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(ScriptedThumbnailer::always_succeeding()),
        bus,
    );
    let stats = pool.stats();

    wait_for_processed(&stats, 1000).await;
    let snapshot = stats.snapshot().await;
    assert_eq!(snapshot.total_processed, 1000);
    assert_eq!(snapshot.success_count, 1000);
    assert_eq!(snapshot.failure_count, 0);

    assert_eq!(queue.depth().await.unwrap(), 0);
    for id in 1..=1000 {
        assert!(
            matches!(store.state_of(id).await, Some(JobState::Completed { .. })),
            "job {id} should be completed"
        );
        assert_eq!(store.pickups_of(id).await, 1, "job {id} picked up once");
    }

    pool.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: shutdown lets the in-flight job finish before returning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_waits_for_in_flight_job() {
    let queue = Arc::new(MemoryJobQueue::new());
    let store = Arc::new(RecordingStore::new());
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();

    store.seed(5, 2, "slow.png").await;
    queue.enqueue(5).await.unwrap();

    let pool = WorkerPool::start(
        fast_config(1),
        queue,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(ScriptedThumbnailer::new([(
            "slow.png",
            Transform::Delay(Duration::from_millis(300)),
        )])),
        Arc::clone(&bus),
    );
    let stats = pool.stats();

    // Wait until the job is in flight, then stop the pool.
    let first = next_event(&mut events).await;
    assert_eq!(first.event_type, "image.processing");

    pool.shutdown().await;

    // Shutdown returned only after the slow transform finished.
    assert!(matches!(
        store.state_of(5).await,
        Some(JobState::Completed { .. })
    ));
    assert_eq!(stats.snapshot().await.total_processed, 1);
}

// ---------------------------------------------------------------------------
// Test: shutdown is bounded even when a transform never returns
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_gives_up_on_a_hung_transform() {
    let queue = Arc::new(MemoryJobQueue::new());
    let store = Arc::new(RecordingStore::new());
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();

    store.seed(77, 6, "stuck.png").await;
    queue.enqueue(77).await.unwrap();

    let config = PipelineConfig {
        shutdown_timeout: Duration::from_millis(100),
        ..fast_config(1)
    };
    let pool = WorkerPool::start(
        config,
        queue,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(ScriptedThumbnailer::new([("stuck.png", Transform::Hang)])),
        Arc::clone(&bus),
    );

    // Wait until the transform is in flight, then stop the pool.
    let first = next_event(&mut events).await;
    assert_eq!(first.event_type, "image.processing");

    tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
        .await
        .expect("shutdown should return once its deadline passes");

    // The worker was detached mid-transform, so the job never reached a
    // terminal state.
    assert!(matches!(
        store.state_of(77).await,
        Some(JobState::Processing)
    ));
}

// ---------------------------------------------------------------------------
// Test: a panicking job is contained and the worker keeps going
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_survives_a_panicking_job() {
    let queue = Arc::new(MemoryJobQueue::new());
    let store = Arc::new(RecordingStore::new());
    let bus = Arc::new(EventBus::default());

    store.seed(1, 3, "poison.png").await;
    store.seed(2, 3, "fine.png").await;
    queue.enqueue(1).await.unwrap();
    queue.enqueue(2).await.unwrap();

    let pool = WorkerPool::start(
        fast_config(1),
        queue,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(ScriptedThumbnailer::new([("poison.png", Transform::Panic)])),
        bus,
    );
    let stats = pool.stats();

    // The same single worker must get past the poison job to reach the
    // second one.
    wait_for_processed(&stats, 2).await;
    let snapshot = stats.snapshot().await;
    assert_eq!(snapshot.total_processed, 2);
    assert_eq!(snapshot.success_count, 1);
    assert_eq!(snapshot.failure_count, 1);

    assert!(matches!(
        store.state_of(2).await,
        Some(JobState::Completed { .. })
    ));

    pool.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: queue outages back off and recover without losing the job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_errors_back_off_and_recover() {
    let queue = Arc::new(FlakyQueue::new(2));
    let store = Arc::new(RecordingStore::new());
    let bus = Arc::new(EventBus::default());

    store.seed(11, 4, "eventually.png").await;
    queue.enqueue(11).await.unwrap();

    let pool = WorkerPool::start(
        fast_config(1),
        queue,
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(ScriptedThumbnailer::always_succeeding()),
        bus,
    );
    let stats = pool.stats();

    wait_for_processed(&stats, 1).await;
    let snapshot = stats.snapshot().await;
    assert_eq!(snapshot.success_count, 1);

    assert!(matches!(
        store.state_of(11).await,
        Some(JobState::Completed { .. })
    ));

    pool.shutdown().await;
}
