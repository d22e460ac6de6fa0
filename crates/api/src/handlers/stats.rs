//! Handlers for the `/stats` resource (worker, connection, and dashboard
//! metrics).

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use darkroom_db::models::status::ImageStatus;
use darkroom_db::repositories::ImageRepo;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::ConnectionStats;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Response body for `GET /stats/workers`.
#[derive(Debug, Serialize)]
pub struct WorkerStatsResponse {
    pub total_processed: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_latency_ms: f64,
    pub current_queue_depth: u64,
}

/// Response body for `GET /stats/dashboard`.
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub total_images: i64,
    /// Images that reached a terminal status since local midnight (UTC).
    pub processed_today: i64,
    /// Completed share of finished images, as a percentage. Zero until
    /// something has finished.
    pub success_rate: f64,
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/stats/workers
///
/// Worker pool counters plus the current queue depth.
pub async fn workers(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<DataResponse<WorkerStatsResponse>>> {
    let snapshot = state.worker_stats.snapshot().await;
    let current_queue_depth = state.queue.depth().await?;

    Ok(Json(DataResponse {
        data: WorkerStatsResponse {
            total_processed: snapshot.total_processed,
            success_count: snapshot.success_count,
            failure_count: snapshot.failure_count,
            average_latency_ms: snapshot.average_latency_ms,
            current_queue_depth,
        },
    }))
}

/// GET /api/v1/stats/connections
///
/// Live WebSocket connection counts from the hub.
pub async fn connections(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<DataResponse<ConnectionStats>>> {
    Ok(Json(DataResponse {
        data: state.hub.stats().await,
    }))
}

/// GET /api/v1/stats/dashboard
///
/// The calling user's pipeline at a glance: per-status totals, today's
/// throughput, and the completed share of finished images.
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<DashboardResponse>>> {
    let mut queued = 0;
    let mut processing = 0;
    let mut completed = 0;
    let mut failed = 0;
    for row in ImageRepo::status_counts_for_owner(&state.pool, user.user_id).await? {
        match ImageStatus::from_id(row.status_id) {
            Some(ImageStatus::Queued) => queued = row.count,
            Some(ImageStatus::Processing) => processing = row.count,
            Some(ImageStatus::Completed) => completed = row.count,
            Some(ImageStatus::Failed) => failed = row.count,
            None => {
                tracing::warn!(status_id = row.status_id, "Unknown status id in counts")
            }
        }
    }

    let finished = completed + failed;
    let success_rate = if finished > 0 {
        completed as f64 / finished as f64 * 100.0
    } else {
        0.0
    };
    let processed_today = ImageRepo::processed_today(&state.pool, user.user_id).await?;

    Ok(Json(DataResponse {
        data: DashboardResponse {
            total_images: queued + processing + completed + failed,
            processed_today,
            success_rate,
            queued,
            processing,
            completed,
            failed,
        },
    }))
}
