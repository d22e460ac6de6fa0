//! Route definitions for the `/stats` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::stats;
use crate::state::AppState;

/// Routes mounted at `/stats` (all require auth).
///
/// ```text
/// GET /workers      -> worker pool counters + queue depth
/// GET /connections  -> live WebSocket connection counts
/// GET /dashboard    -> the calling user's totals and success rate
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workers", get(stats::workers))
        .route("/connections", get(stats::connections))
        .route("/dashboard", get(stats::dashboard))
}
