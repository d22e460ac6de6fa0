pub mod auth;
pub mod health;
pub mod images;
pub mod stats;
pub mod system;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                     WebSocket (optional ?token=)
///
/// /auth/register          register (public)
/// /auth/login             login (public)
/// /auth/profile           current user (requires auth)
///
/// /images                 upload (multipart POST), list (GET)
/// /images/{id}            get, delete
///
/// /stats/workers          worker pool counters + queue depth
/// /stats/connections      live WebSocket connection counts
/// /stats/dashboard        the calling user's totals and success rate
///
/// /system/notice          broadcast an announcement (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoint.
        .route("/ws", get(ws::ws_handler))
        // Authentication routes (register, login, profile).
        .nest("/auth", auth::router())
        // Image upload and management.
        .nest("/images", images::router())
        // Pipeline and connection statistics.
        .nest("/stats", stats::router())
        // Operator announcements.
        .nest("/system", system::router())
}
