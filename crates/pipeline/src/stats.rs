//! Aggregate worker metrics.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StatsInner {
    total_processed: u64,
    success_count: u64,
    failure_count: u64,
    average_latency_ms: f64,
}

/// Shared counters updated by every worker and read by the stats API.
///
/// Writes are rare (one per processed job) and reads are cheap
/// snapshots, so a single RwLock is enough.
#[derive(Debug, Default)]
pub struct WorkerStats {
    inner: RwLock<StatsInner>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatsSnapshot {
    pub total_processed: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_latency_ms: f64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished job iteration.
    ///
    /// The average is maintained incrementally over all processed jobs,
    /// successes and failures alike.
    pub async fn record(&self, success: bool, latency: Duration) {
        let mut inner = self.inner.write().await;
        inner.total_processed += 1;
        if success {
            inner.success_count += 1;
        } else {
            inner.failure_count += 1;
        }
        let n = inner.total_processed as f64;
        inner.average_latency_ms += (latency.as_secs_f64() * 1000.0 - inner.average_latency_ms) / n;
    }

    pub async fn snapshot(&self) -> WorkerStatsSnapshot {
        let inner = self.inner.read().await;
        WorkerStatsSnapshot {
            total_processed: inner.total_processed,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            average_latency_ms: inner.average_latency_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_successes_and_failures_separately() {
        let stats = WorkerStats::new();

        stats.record(true, Duration::from_millis(10)).await;
        stats.record(false, Duration::from_millis(10)).await;
        stats.record(true, Duration::from_millis(10)).await;

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.total_processed, 3);
        assert_eq!(snapshot.success_count, 2);
        assert_eq!(snapshot.failure_count, 1);
    }

    #[tokio::test]
    async fn average_latency_is_the_running_mean() {
        let stats = WorkerStats::new();

        stats.record(true, Duration::from_millis(100)).await;
        stats.record(true, Duration::from_millis(200)).await;

        let snapshot = stats.snapshot().await;
        assert!((snapshot.average_latency_ms - 150.0).abs() < 1e-9);

        stats.record(false, Duration::from_millis(600)).await;
        let snapshot = stats.snapshot().await;
        assert!((snapshot.average_latency_ms - 300.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_stats_snapshot_is_all_zeroes() {
        let snapshot = WorkerStats::new().snapshot().await;
        assert_eq!(snapshot.total_processed, 0);
        assert_eq!(snapshot.success_count, 0);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.average_latency_ms, 0.0);
    }
}
