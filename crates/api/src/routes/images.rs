//! Route definitions for the `/images` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Transport-level body ceiling for uploads. The configured per-file
/// limit is enforced in the handler; this only caps what Axum will
/// buffer at all.
const UPLOAD_BODY_LIMIT_BYTES: usize = 64 * 1024 * 1024;

/// Routes mounted at `/images`.
///
/// ```text
/// POST   /      -> upload (multipart)
/// GET    /      -> list (?status, page, page_size)
/// GET    /{id}  -> get
/// DELETE /{id}  -> delete
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(images::list).post(images::upload))
        .route("/{id}", get(images::get_by_id).delete(images::delete))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT_BYTES))
}
