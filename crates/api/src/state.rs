use std::sync::Arc;

use darkroom_pipeline::WorkerStats;
use darkroom_queue::JobQueue;

use crate::config::ServerConfig;
use crate::ws::HubHandle;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: darkroom_db::DbPool,
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
    /// Handle to the WebSocket notification hub.
    pub hub: HubHandle,
    /// Job queue fed by the upload handlers.
    pub queue: Arc<dyn JobQueue>,
    /// Centralized event bus for publishing pipeline events.
    pub event_bus: Arc<darkroom_events::EventBus>,
    /// Counters maintained by the worker pool.
    pub worker_stats: Arc<WorkerStats>,
}
